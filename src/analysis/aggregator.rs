//! Record aggregation and statistics.
//!
//! Pure functions over unified records. Every function accepts empty input
//! and returns zeroed statistics for it. Public structs carry values rounded
//! to whole numbers; the `*_raw` helpers expose the unrounded figures that
//! threshold checks need.

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::{ServiceType, TimeRange, UnifiedActivity, UnifiedMeeting, UnifiedMessage};

/// Stable identity for a person across services: the lowercased email
/// when known, the service-local id otherwise.
pub fn user_key(id: &str, email: Option<&str>) -> String {
    match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => email.to_lowercase(),
        None => id.to_string(),
    }
}

/// Message count for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelActivity {
    pub service: ServiceType,
    pub id: String,
    pub name: String,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStats {
    pub total: usize,
    pub by_service: BTreeMap<ServiceType, usize>,
    /// Messages per UTC hour of day, 24 buckets.
    pub by_hour: Vec<usize>,
    /// Messages per weekday, Monday first.
    pub by_weekday: Vec<usize>,
    pub by_user: BTreeMap<String, usize>,
    /// Mean content length in characters.
    pub average_length: u32,
    pub threaded: usize,
    pub with_attachments: usize,
    pub reactions: usize,
    pub top_channels: Vec<ChannelActivity>,
}

impl Default for MessageStats {
    fn default() -> Self {
        Self {
            total: 0,
            by_service: BTreeMap::new(),
            by_hour: vec![0; 24],
            by_weekday: vec![0; 7],
            by_user: BTreeMap::new(),
            average_length: 0,
            threaded: 0,
            with_attachments: 0,
            reactions: 0,
            top_channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSummary {
    pub id: String,
    pub service: ServiceType,
    pub title: String,
    pub duration: i64,
    pub participant_count: usize,
}

impl MeetingSummary {
    fn of(meeting: &UnifiedMeeting) -> Self {
        Self {
            id: meeting.id.clone(),
            service: meeting.service,
            title: meeting.title.clone(),
            duration: meeting.duration,
            participant_count: meeting.participants.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingStats {
    pub total: usize,
    pub by_service: BTreeMap<ServiceType, usize>,
    /// Total minutes in meetings.
    pub total_duration: i64,
    pub average_duration: u32,
    pub average_participants: u32,
    pub recorded: usize,
    /// Meeting starts per UTC hour of day, 24 buckets.
    pub by_hour: Vec<usize>,
    pub longest: Option<MeetingSummary>,
    pub largest: Option<MeetingSummary>,
}

impl Default for MeetingStats {
    fn default() -> Self {
        Self {
            total: 0,
            by_service: BTreeMap::new(),
            total_duration: 0,
            average_duration: 0,
            average_participants: 0,
            recorded: 0,
            by_hour: vec![0; 24],
            longest: None,
            largest: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub total: usize,
    pub by_service: BTreeMap<ServiceType, usize>,
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossServiceAnalysis {
    pub messages_by_service: BTreeMap<ServiceType, usize>,
    pub meetings_by_service: BTreeMap<ServiceType, usize>,
    /// Messages plus meetings per service.
    pub activity_by_service: BTreeMap<ServiceType, usize>,
    pub services_by_user: BTreeMap<String, BTreeSet<ServiceType>>,
    pub total_users: usize,
    pub multi_service_users: usize,
    /// Percentage of users active on more than one service.
    pub collaboration_score: u32,
    /// Evenness of activity across the services in use.
    pub service_balance: u32,
}

/// Count of records failing each completeness check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingFields {
    pub message_content: usize,
    pub author_name: usize,
    pub timestamp: usize,
    pub channel: usize,
    pub meeting_title: usize,
    pub participants: usize,
    pub duration: usize,
    pub organizer: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuality {
    /// `None` when there are no messages to score.
    pub message_score: Option<u32>,
    /// `None` when there are no meetings to score.
    pub meeting_score: Option<u32>,
    pub overall: u32,
    pub missing: MissingFields,
}

pub fn calculate_message_stats(messages: &[UnifiedMessage], top_n: usize) -> MessageStats {
    let mut stats = MessageStats {
        total: messages.len(),
        ..MessageStats::default()
    };

    let mut channels: Vec<ChannelActivity> = Vec::new();
    let mut channel_index: HashMap<(ServiceType, &str), usize> = HashMap::new();

    for message in messages {
        *stats.by_service.entry(message.service).or_default() += 1;
        stats.by_hour[message.timestamp.hour() as usize] += 1;
        stats.by_weekday[message.timestamp.weekday().num_days_from_monday() as usize] += 1;
        *stats
            .by_user
            .entry(user_key(&message.author.id, message.author.email.as_deref()))
            .or_default() += 1;

        if message.thread.is_some() {
            stats.threaded += 1;
        }
        if !message.attachments.is_empty() {
            stats.with_attachments += 1;
        }
        stats.reactions += message.reactions.iter().map(|r| r.count as usize).sum::<usize>();

        if let Some(channel) = &message.channel {
            let key = (message.service, channel.id.as_str());
            match channel_index.get(&key) {
                Some(&i) => channels[i].message_count += 1,
                None => {
                    channel_index.insert(key, channels.len());
                    channels.push(ChannelActivity {
                        service: message.service,
                        id: channel.id.clone(),
                        name: channel.name.clone(),
                        message_count: 1,
                    });
                }
            }
        }
    }

    stats.average_length = average_message_length_raw(messages).round() as u32;

    // Stable sort keeps encounter order among equal counts.
    channels.sort_by_key(|c| Reverse(c.message_count));
    channels.truncate(top_n);
    stats.top_channels = channels;

    stats
}

/// Mean content length in characters, 0 for no messages.
pub fn average_message_length_raw(messages: &[UnifiedMessage]) -> f64 {
    if messages.is_empty() {
        return 0.0;
    }
    let total: usize = messages.iter().map(|m| m.content.chars().count()).sum();
    total as f64 / messages.len() as f64
}

pub fn calculate_meeting_stats(meetings: &[UnifiedMeeting]) -> MeetingStats {
    let mut stats = MeetingStats {
        total: meetings.len(),
        ..MeetingStats::default()
    };

    let mut participant_total = 0usize;
    let mut longest: Option<&UnifiedMeeting> = None;
    let mut largest: Option<&UnifiedMeeting> = None;

    for meeting in meetings {
        *stats.by_service.entry(meeting.service).or_default() += 1;
        stats.total_duration += meeting.duration.max(0);
        stats.by_hour[meeting.start_time.hour() as usize] += 1;
        participant_total += meeting.participants.len();

        if meeting.recording.as_ref().is_some_and(|r| r.available) {
            stats.recorded += 1;
        }

        // Strict comparison: the first meeting seen wins ties.
        if longest.map_or(true, |l| meeting.duration > l.duration) {
            longest = Some(meeting);
        }
        if largest.map_or(true, |l| meeting.participants.len() > l.participants.len()) {
            largest = Some(meeting);
        }
    }

    if !meetings.is_empty() {
        stats.average_duration = average_meeting_duration_raw(meetings).round() as u32;
        stats.average_participants =
            (participant_total as f64 / meetings.len() as f64).round() as u32;
    }
    stats.longest = longest.map(MeetingSummary::of);
    stats.largest = largest.map(MeetingSummary::of);

    stats
}

/// Mean meeting length in minutes, 0 for no meetings.
pub fn average_meeting_duration_raw(meetings: &[UnifiedMeeting]) -> f64 {
    if meetings.is_empty() {
        return 0.0;
    }
    let total: i64 = meetings.iter().map(|m| m.duration.max(0)).sum();
    total as f64 / meetings.len() as f64
}

pub fn calculate_activity_stats(activities: &[UnifiedActivity]) -> ActivityStats {
    let mut stats = ActivityStats {
        total: activities.len(),
        ..ActivityStats::default()
    };
    for activity in activities {
        *stats.by_service.entry(activity.service).or_default() += 1;
        *stats.by_type.entry(activity.kind.clone()).or_default() += 1;
    }
    stats
}

/// Services each person used, keyed by [`user_key`].
pub fn services_by_user(
    messages: &[UnifiedMessage],
    meetings: &[UnifiedMeeting],
) -> BTreeMap<String, BTreeSet<ServiceType>> {
    let mut users: BTreeMap<String, BTreeSet<ServiceType>> = BTreeMap::new();
    let mut record = |key: String, service: ServiceType| {
        if !key.is_empty() {
            users.entry(key).or_default().insert(service);
        }
    };

    for message in messages {
        record(
            user_key(&message.author.id, message.author.email.as_deref()),
            message.service,
        );
    }
    for meeting in meetings {
        record(
            user_key(&meeting.organizer.id, meeting.organizer.email.as_deref()),
            meeting.service,
        );
        for participant in &meeting.participants {
            record(
                user_key(&participant.id, participant.email.as_deref()),
                meeting.service,
            );
        }
    }

    users
}

/// Percentage of users on more than one service, 0 with no users.
pub fn collaboration_score_raw(users: &BTreeMap<String, BTreeSet<ServiceType>>) -> f64 {
    if users.is_empty() {
        return 0.0;
    }
    let multi = users.values().filter(|s| s.len() > 1).count();
    100.0 * multi as f64 / users.len() as f64
}

pub fn calculate_cross_service_analysis(
    messages: &[UnifiedMessage],
    meetings: &[UnifiedMeeting],
) -> CrossServiceAnalysis {
    let mut analysis = CrossServiceAnalysis::default();

    for message in messages {
        *analysis.messages_by_service.entry(message.service).or_default() += 1;
        *analysis.activity_by_service.entry(message.service).or_default() += 1;
    }
    for meeting in meetings {
        *analysis.meetings_by_service.entry(meeting.service).or_default() += 1;
        *analysis.activity_by_service.entry(meeting.service).or_default() += 1;
    }

    let users = services_by_user(messages, meetings);
    analysis.total_users = users.len();
    analysis.multi_service_users = users.values().filter(|s| s.len() > 1).count();
    analysis.collaboration_score = collaboration_score_raw(&users).round() as u32;

    let counts: Vec<usize> = analysis.activity_by_service.values().copied().collect();
    analysis.service_balance = balance_score(&counts);
    analysis.services_by_user = users;

    analysis
}

/// `100 − 100 × (population stddev / mean)` clamped to `[0, 100]`.
///
/// Fewer than two buckets, or an all-zero distribution, scores 0: there is
/// nothing to balance.
pub fn balance_score_raw(counts: &[f64]) -> f64 {
    if counts.len() < 2 {
        return 0.0;
    }
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<f64>() / n;
    if mean <= 0.0 || !mean.is_finite() {
        return 0.0;
    }
    let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    (100.0 - 100.0 * variance.sqrt() / mean).clamp(0.0, 100.0)
}

pub fn balance_score(counts: &[usize]) -> u32 {
    let counts: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    balance_score_raw(&counts).round() as u32
}

fn message_completeness(messages: &[UnifiedMessage], missing: &mut MissingFields) -> Option<f64> {
    if messages.is_empty() {
        return None;
    }
    let mut passed = 0usize;
    for message in messages {
        let checks = [
            (!message.content.trim().is_empty(), &mut missing.message_content),
            (!message.author.name.trim().is_empty(), &mut missing.author_name),
            (message.timestamp.timestamp() > 0, &mut missing.timestamp),
            (
                message.channel.as_ref().is_some_and(|c| !c.id.is_empty()),
                &mut missing.channel,
            ),
        ];
        for (ok, counter) in checks {
            if ok {
                passed += 1;
            } else {
                *counter += 1;
            }
        }
    }
    Some(100.0 * passed as f64 / (messages.len() * 4) as f64)
}

fn meeting_completeness(meetings: &[UnifiedMeeting], missing: &mut MissingFields) -> Option<f64> {
    if meetings.is_empty() {
        return None;
    }
    let mut passed = 0usize;
    for meeting in meetings {
        let has_organizer =
            !meeting.organizer.id.trim().is_empty() || !meeting.organizer.name.trim().is_empty();
        let checks = [
            (!meeting.title.trim().is_empty(), &mut missing.meeting_title),
            (!meeting.participants.is_empty(), &mut missing.participants),
            (meeting.duration > 0, &mut missing.duration),
            (has_organizer, &mut missing.organizer),
        ];
        for (ok, counter) in checks {
            if ok {
                passed += 1;
            } else {
                *counter += 1;
            }
        }
    }
    Some(100.0 * passed as f64 / (meetings.len() * 4) as f64)
}

/// Overall completeness before rounding.
pub fn data_quality_raw(messages: &[UnifiedMessage], meetings: &[UnifiedMeeting]) -> f64 {
    let mut missing = MissingFields::default();
    overall_quality(
        message_completeness(messages, &mut missing),
        meeting_completeness(meetings, &mut missing),
    )
}

/// Mean of the components that have records; vacuously 100 for none.
fn overall_quality(message: Option<f64>, meeting: Option<f64>) -> f64 {
    match (message, meeting) {
        (Some(a), Some(b)) => (a + b) / 2.0,
        (Some(score), None) | (None, Some(score)) => score,
        (None, None) => 100.0,
    }
}

pub fn calculate_data_quality(
    messages: &[UnifiedMessage],
    meetings: &[UnifiedMeeting],
) -> DataQuality {
    let mut missing = MissingFields::default();
    let message = message_completeness(messages, &mut missing);
    let meeting = meeting_completeness(meetings, &mut missing);

    DataQuality {
        message_score: message.map(|score| score.round() as u32),
        meeting_score: meeting.map(|score| score.round() as u32),
        overall: overall_quality(message, meeting).round() as u32,
        missing,
    }
}

/// Earliest and latest instant across all records.
pub fn time_range(
    messages: &[UnifiedMessage],
    meetings: &[UnifiedMeeting],
    activities: &[UnifiedActivity],
) -> Option<TimeRange> {
    let starts = messages
        .iter()
        .map(|m| m.timestamp)
        .chain(meetings.iter().map(|m| m.start_time))
        .chain(activities.iter().map(|a| a.timestamp));
    let ends = messages
        .iter()
        .map(|m| m.timestamp)
        .chain(meetings.iter().map(|m| m.end_time))
        .chain(activities.iter().map(|a| a.timestamp));

    Some(TimeRange {
        start: starts.min()?,
        end: ends.max()?,
    })
}
