//! Record builders shared by the analysis tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::models::{
    Author, ChannelRef, Dataset, Organizer, Participant, RecordMetadata, ServiceType, ThreadRef,
    UnifiedMeeting, UnifiedMessage,
};

/// 2024-01-01 is a Monday.
pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
}

pub fn message(
    service: ServiceType,
    user: &str,
    timestamp: DateTime<Utc>,
    content: &str,
    channel: Option<&str>,
) -> UnifiedMessage {
    UnifiedMessage {
        id: format!("{service}-{user}-{}", timestamp.timestamp_millis()),
        service,
        timestamp,
        author: Author {
            id: format!("{service}:{user}"),
            name: user.to_string(),
            email: Some(format!("{user}@example.com")),
            avatar: None,
        },
        content: content.to_string(),
        channel: channel.map(|c| ChannelRef {
            id: c.to_string(),
            name: c.to_string(),
        }),
        thread: None,
        reactions: Vec::new(),
        attachments: Vec::new(),
        metadata: RecordMetadata::default(),
    }
}

pub fn reply(mut msg: UnifiedMessage, thread_id: &str) -> UnifiedMessage {
    msg.thread = Some(ThreadRef {
        id: thread_id.to_string(),
        parent_id: Some(thread_id.to_string()),
    });
    msg
}

pub fn meeting(
    service: ServiceType,
    id: &str,
    start: DateTime<Utc>,
    minutes: i64,
    participants: &[&str],
) -> UnifiedMeeting {
    let organizer = participants.first().copied().unwrap_or("organizer");
    UnifiedMeeting {
        id: id.to_string(),
        service,
        title: format!("Meeting {id}"),
        start_time: start,
        end_time: start + Duration::minutes(minutes),
        duration: minutes,
        participants: participants
            .iter()
            .map(|p| Participant {
                id: format!("{service}:{p}"),
                name: p.to_string(),
                email: Some(format!("{p}@example.com")),
                join_time: None,
                leave_time: None,
                speaking_time: None,
            })
            .collect(),
        organizer: Organizer {
            id: format!("{service}:{organizer}"),
            name: organizer.to_string(),
            email: Some(format!("{organizer}@example.com")),
        },
        recording: None,
        metadata: RecordMetadata::default(),
    }
}

/// 120 Slack messages and 10 Teams meetings over one working week, three users
/// active on both services.
pub fn sample_dataset() -> Dataset {
    let users = ["ana", "ben", "cho"];
    let channels = ["general", "dev", "random"];
    let messages = (0..120)
        .map(|i| {
            let day = 1 + (i % 5) as u32;
            let hour = 9 + (i % 9) as u32;
            message(
                ServiceType::Slack,
                users[i % 3],
                at(day, hour, (i % 60) as u32),
                "status update for the sprint",
                Some(channels[i % 3]),
            )
        })
        .collect();
    let meetings = (0..10)
        .map(|i| {
            meeting(
                ServiceType::Teams,
                &format!("m{i}"),
                at(1 + (i % 5) as u32, 10, 0),
                30,
                &users,
            )
        })
        .collect();
    Dataset {
        messages,
        meetings,
        activities: Vec::new(),
    }
}
