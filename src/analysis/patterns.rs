//! Temporal and social communication patterns.
//!
//! Works on local wall-clock time: the schedule's UTC offset shifts every
//! timestamp before it is bucketed by hour or weekday.

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::aggregator::user_key;
use crate::models::{ServiceType, UnifiedMeeting, UnifiedMessage};

/// Working-hours window used to classify after-hours activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkSchedule {
    /// First working hour, inclusive.
    pub day_start_hour: u32,
    /// End of the working day, exclusive.
    pub day_end_hour: u32,
    pub utc_offset_hours: i32,
}

impl Default for WorkSchedule {
    fn default() -> Self {
        Self {
            day_start_hour: 9,
            day_end_hour: 18,
            utc_offset_hours: 0,
        }
    }
}

impl WorkSchedule {
    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours.clamp(-23, 23) * 3600).unwrap_or(Utc.fix())
    }

    fn local(&self, ts: DateTime<Utc>) -> DateTime<FixedOffset> {
        ts.with_timezone(&self.offset())
    }

    pub fn local_hour(&self, ts: DateTime<Utc>) -> u32 {
        self.local(ts).hour()
    }

    pub fn is_after_hours(&self, ts: DateTime<Utc>) -> bool {
        let hour = self.local_hour(ts);
        hour < self.day_start_hour || hour >= self.day_end_hour
    }

    pub fn is_weekend(&self, ts: DateTime<Utc>) -> bool {
        matches!(self.local(ts).weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// Per-person load over the analysed period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWorkload {
    pub user: String,
    pub messages: usize,
    pub after_hours_messages: usize,
    pub weekend_messages: usize,
    pub meetings: usize,
    pub meeting_minutes: i64,
}

/// Two people who replied to each other or met.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionPair {
    pub first: String,
    pub second: String,
    pub interactions: usize,
}

/// Unrounded pattern figures. Alert thresholds compare against these.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommunicationPatterns {
    pub after_hours_ratio: f64,
    pub weekend_ratio: f64,
    /// Share of consecutive actions by one person that changed service.
    pub platform_switch_ratio: f64,
    pub peak_hours: Vec<u32>,
    /// Mean minutes between consecutive thread messages by different people.
    pub average_response_minutes: Option<f64>,
    /// Heaviest first.
    pub workloads: Vec<UserWorkload>,
    /// Most frequent first.
    pub interaction_pairs: Vec<InteractionPair>,
    pub isolated_users: Vec<String>,
}

/// Rounded view of [`CommunicationPatterns`] for reports and prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSummary {
    pub after_hours_percent: u32,
    pub weekend_percent: u32,
    pub platform_switch_percent: u32,
    pub peak_hours: Vec<u32>,
    pub average_response_minutes: Option<u32>,
    pub top_workloads: Vec<UserWorkload>,
    pub top_interactions: Vec<InteractionPair>,
    pub isolated_users: Vec<String>,
}

fn percent(ratio: f64) -> u32 {
    (ratio * 100.0).round().clamp(0.0, 100.0) as u32
}

impl CommunicationPatterns {
    pub fn summary(&self, top_n: usize) -> PatternSummary {
        PatternSummary {
            after_hours_percent: percent(self.after_hours_ratio),
            weekend_percent: percent(self.weekend_ratio),
            platform_switch_percent: percent(self.platform_switch_ratio),
            peak_hours: self.peak_hours.clone(),
            average_response_minutes: self.average_response_minutes.map(|m| m.round() as u32),
            top_workloads: self.workloads.iter().take(top_n).cloned().collect(),
            top_interactions: self.interaction_pairs.iter().take(top_n).cloned().collect(),
            isolated_users: self.isolated_users.clone(),
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn meeting_attendees(meeting: &UnifiedMeeting) -> BTreeSet<String> {
    std::iter::once(user_key(&meeting.organizer.id, meeting.organizer.email.as_deref()))
        .chain(
            meeting
                .participants
                .iter()
                .map(|p| user_key(&p.id, p.email.as_deref())),
        )
        .filter(|k| !k.is_empty())
        .collect()
}

/// Messages grouped by conversation thread, in timestamp order. A root
/// message joins the thread that uses its id.
fn threads(messages: &[UnifiedMessage]) -> Vec<Vec<&UnifiedMessage>> {
    let mut groups: HashMap<(ServiceType, &str), Vec<&UnifiedMessage>> = HashMap::new();
    for message in messages {
        let id = message.thread.as_ref().map_or(message.id.as_str(), |t| t.id.as_str());
        groups.entry((message.service, id)).or_default().push(message);
    }
    let mut threads: Vec<Vec<&UnifiedMessage>> = groups
        .into_values()
        .filter(|g| g.len() > 1)
        .map(|mut g| {
            g.sort_by_key(|m| m.timestamp);
            g
        })
        .collect();
    threads.sort_by_key(|g| (g[0].timestamp, g[0].id.clone()));
    threads
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn workload<'a>(loads: &'a mut BTreeMap<String, UserWorkload>, user: &str) -> &'a mut UserWorkload {
    loads
        .entry(user.to_string())
        .or_insert_with(|| UserWorkload {
            user: user.to_string(),
            messages: 0,
            after_hours_messages: 0,
            weekend_messages: 0,
            meetings: 0,
            meeting_minutes: 0,
        })
}

pub fn analyze_patterns(
    messages: &[UnifiedMessage],
    meetings: &[UnifiedMeeting],
    schedule: &WorkSchedule,
    peak_hour_count: usize,
) -> CommunicationPatterns {
    let mut workloads: BTreeMap<String, UserWorkload> = BTreeMap::new();
    let mut hourly = [0usize; 24];
    let mut timeline: BTreeMap<String, Vec<(DateTime<Utc>, ServiceType)>> = BTreeMap::new();
    let mut after_hours = 0;
    let mut weekend = 0;

    for message in messages {
        let user = user_key(&message.author.id, message.author.email.as_deref());
        let is_after_hours = schedule.is_after_hours(message.timestamp);
        let is_weekend = schedule.is_weekend(message.timestamp);
        after_hours += usize::from(is_after_hours);
        weekend += usize::from(is_weekend);
        hourly[schedule.local_hour(message.timestamp) as usize] += 1;

        if user.is_empty() {
            continue;
        }
        let load = workload(&mut workloads, &user);
        load.messages += 1;
        load.after_hours_messages += usize::from(is_after_hours);
        load.weekend_messages += usize::from(is_weekend);
        timeline
            .entry(user)
            .or_default()
            .push((message.timestamp, message.service));
    }

    for meeting in meetings {
        hourly[schedule.local_hour(meeting.start_time) as usize] += 1;
        for user in meeting_attendees(meeting) {
            let load = workload(&mut workloads, &user);
            load.meetings += 1;
            load.meeting_minutes += meeting.duration.max(0);
            timeline
                .entry(user)
                .or_default()
                .push((meeting.start_time, meeting.service));
        }
    }

    let mut transitions = 0;
    let mut switches = 0;
    for events in timeline.values_mut() {
        events.sort_by_key(|(ts, _)| *ts);
        for pair in events.windows(2) {
            transitions += 1;
            if pair[0].1 != pair[1].1 {
                switches += 1;
            }
        }
    }

    let mut peak_hours: Vec<u32> = (0..24u32).filter(|&h| hourly[h as usize] > 0).collect();
    peak_hours.sort_by_key(|&h| (Reverse(hourly[h as usize]), h));
    peak_hours.truncate(peak_hour_count);

    let mut response_total = 0.0;
    let mut responses = 0usize;
    let mut pairs: BTreeMap<(String, String), usize> = BTreeMap::new();
    for thread in threads(messages) {
        for window in thread.windows(2) {
            let (prev, next) = (window[0], window[1]);
            let a = user_key(&prev.author.id, prev.author.email.as_deref());
            let b = user_key(&next.author.id, next.author.email.as_deref());
            if a == b || a.is_empty() || b.is_empty() {
                continue;
            }
            response_total += (next.timestamp - prev.timestamp).num_seconds() as f64 / 60.0;
            responses += 1;
            *pairs.entry(pair_key(&a, &b)).or_default() += 1;
        }
    }
    for meeting in meetings {
        let attendees: Vec<String> = meeting_attendees(meeting).into_iter().collect();
        for (i, a) in attendees.iter().enumerate() {
            for b in &attendees[i + 1..] {
                *pairs.entry(pair_key(a, b)).or_default() += 1;
            }
        }
    }

    let connected: BTreeSet<&str> = pairs
        .keys()
        .flat_map(|(a, b)| [a.as_str(), b.as_str()])
        .collect();
    let isolated_users: Vec<String> = workloads
        .keys()
        .filter(|u| !connected.contains(u.as_str()))
        .cloned()
        .collect();

    let mut interaction_pairs: Vec<InteractionPair> = pairs
        .into_iter()
        .map(|((first, second), interactions)| InteractionPair {
            first,
            second,
            interactions,
        })
        .collect();
    interaction_pairs.sort_by_key(|p| Reverse(p.interactions));

    let mut workloads: Vec<UserWorkload> = workloads.into_values().collect();
    workloads.sort_by_key(|w| (Reverse(w.messages), Reverse(w.meeting_minutes)));

    CommunicationPatterns {
        after_hours_ratio: ratio(after_hours, messages.len()),
        weekend_ratio: ratio(weekend, messages.len()),
        platform_switch_ratio: ratio(switches, transitions),
        peak_hours,
        average_response_minutes: (responses > 0).then(|| response_total / responses as f64),
        workloads,
        interaction_pairs,
        isolated_users,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{at, meeting, message, reply};
    use crate::models::ServiceType::*;

    #[test]
    fn test_empty_input() {
        let patterns = analyze_patterns(&[], &[], &WorkSchedule::default(), 3);
        assert_eq!(patterns, CommunicationPatterns::default());
        assert_eq!(patterns.summary(5), PatternSummary::default());
    }

    #[test]
    fn test_after_hours_and_weekend_ratios() {
        // Jan 6 2024 is a Saturday.
        let messages = vec![
            message(Slack, "ana", at(1, 10, 0), "x", None),
            message(Slack, "ana", at(1, 20, 0), "x", None),
            message(Slack, "ben", at(2, 7, 59), "x", None),
            message(Slack, "ben", at(6, 11, 0), "x", None),
        ];
        let patterns = analyze_patterns(&messages, &[], &WorkSchedule::default(), 3);
        assert!((patterns.after_hours_ratio - 0.5).abs() < 1e-9);
        assert!((patterns.weekend_ratio - 0.25).abs() < 1e-9);

        let summary = patterns.summary(5);
        assert_eq!(summary.after_hours_percent, 50);
        assert_eq!(summary.weekend_percent, 25);
    }

    #[test]
    fn test_utc_offset_shifts_classification() {
        let messages = vec![message(Slack, "ana", at(1, 1, 0), "x", None)];
        let tokyo = WorkSchedule {
            utc_offset_hours: 9,
            ..WorkSchedule::default()
        };
        let patterns = analyze_patterns(&messages, &[], &tokyo, 3);
        assert_eq!(patterns.after_hours_ratio, 0.0);
        assert_eq!(patterns.peak_hours, vec![10]);
    }

    #[test]
    fn test_platform_switching() {
        let messages = vec![
            message(Slack, "ana", at(1, 9, 0), "x", None),
            message(Discord, "ana", at(1, 9, 5), "x", None),
            message(Discord, "ana", at(1, 9, 10), "x", None),
            message(Slack, "ben", at(1, 9, 0), "x", None),
        ];
        let patterns = analyze_patterns(&messages, &[], &WorkSchedule::default(), 3);
        assert!((patterns.platform_switch_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_peak_hours_tie_break_by_hour() {
        let messages = vec![
            message(Slack, "a", at(1, 15, 0), "x", None),
            message(Slack, "a", at(1, 11, 0), "x", None),
            message(Slack, "a", at(1, 11, 30), "x", None),
            message(Slack, "a", at(1, 9, 0), "x", None),
        ];
        let patterns = analyze_patterns(&messages, &[], &WorkSchedule::default(), 2);
        assert_eq!(patterns.peak_hours, vec![11, 9]);
    }

    #[test]
    fn test_threads_response_time_and_pairs() {
        let mut root = message(Slack, "ana", at(1, 9, 0), "question", None);
        root.id = "t1".to_string();
        let messages = vec![
            root,
            reply(message(Slack, "ben", at(1, 9, 10), "answer", None), "t1"),
            reply(message(Slack, "ana", at(1, 9, 30), "thanks", None), "t1"),
            message(Slack, "cho", at(1, 12, 0), "alone", None),
        ];
        let patterns = analyze_patterns(&messages, &[], &WorkSchedule::default(), 3);

        assert_eq!(patterns.average_response_minutes, Some(15.0));
        assert_eq!(patterns.interaction_pairs.len(), 1);
        assert_eq!(patterns.interaction_pairs[0].first, "ana@example.com");
        assert_eq!(patterns.interaction_pairs[0].interactions, 2);
        assert_eq!(patterns.isolated_users, vec!["cho@example.com".to_string()]);
    }

    #[test]
    fn test_meetings_count_toward_workload_and_pairs() {
        let meetings = vec![meeting(Teams, "m1", at(1, 10, 0), 45, &["ana", "ben"])];
        let messages = vec![message(Slack, "ana", at(1, 9, 0), "x", None)];
        let patterns = analyze_patterns(&messages, &meetings, &WorkSchedule::default(), 3);

        let ana = &patterns.workloads[0];
        assert_eq!(ana.user, "ana@example.com");
        assert_eq!(ana.meetings, 1);
        assert_eq!(ana.meeting_minutes, 45);
        assert_eq!(patterns.interaction_pairs[0].interactions, 1);
        assert!(patterns.isolated_users.is_empty());
        // ana moved from Slack to Teams
        assert!((patterns.platform_switch_ratio - 1.0).abs() < 1e-9);
    }
}
