// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Conversions from core domain types to the wire types in `airwave-api`.

use std::time::SystemTime;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use airwave_api::{BackgroundStatus, EventPayload, ScheduleInfo, StreamInfo};
use airwave_core::{BackgroundTrackState, BroadcastSession, BusEvent, ScheduleRecord};

pub fn rfc3339(at: SystemTime) -> String {
    OffsetDateTime::from(at).format(&Rfc3339).unwrap_or_default()
}

pub fn stream_info(session: &BroadcastSession) -> StreamInfo {
    let elapsed = SystemTime::now().duration_since(session.started_at).unwrap_or_default();
    StreamInfo {
        id: session.stream_id.to_string(),
        title: session.title.clone(),
        streamer_name: session.producer_name.clone(),
        listener_count: session.listener_count(),
        start_time: rfc3339(session.started_at),
        duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    }
}

pub fn background_status(state: BackgroundTrackState) -> BackgroundStatus {
    BackgroundStatus {
        current_track: state.current_track,
        is_active: state.is_active,
        rotation_mode: state.rotation_mode,
        schedule_expiry: state.schedule_expiry.map(rfc3339),
    }
}

pub fn schedule_info(record: ScheduleRecord) -> ScheduleInfo {
    ScheduleInfo {
        id: record.id,
        track_id: record.track_id,
        duration_minutes: record.duration_minutes,
        created_by: record.created_by,
        created_at: rfc3339(record.created_at),
    }
}

pub fn event_payload(event: BusEvent) -> EventPayload {
    match event {
        BusEvent::StreamStarted { stream_id, title, streamer_name } => {
            EventPayload::StreamStarted { stream_id: stream_id.to_string(), title, streamer_name }
        },
        BusEvent::StreamEnded { stream_id, title, reason } => {
            EventPayload::StreamEnded { stream_id: stream_id.to_string(), title, reason }
        },
        BusEvent::ListenerCount { stream_id, count } => {
            EventPayload::ListenerCount { stream_id: stream_id.to_string(), count }
        },
        BusEvent::BackgroundTrackChanged { track } => EventPayload::BackgroundTrackChanged { track },
        BusEvent::BackgroundStateChanged { is_active } => {
            EventPayload::BackgroundStateChanged { is_active }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airwave_core::{RotationMode, StreamId};
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn timestamps_are_rfc3339_utc() {
        let at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(rfc3339(at), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn inactive_background_has_no_expiry() {
        let status = background_status(BackgroundTrackState::default());
        assert!(!status.is_active);
        assert_eq!(status.rotation_mode, RotationMode::Continuous);
        assert!(status.schedule_expiry.is_none());
    }

    #[test]
    fn bus_events_keep_their_fields() {
        let payload = event_payload(BusEvent::StreamEnded {
            stream_id: StreamId::from("s1"),
            title: "Show".into(),
            reason: "producer disconnected".into(),
        });
        assert_eq!(
            payload,
            EventPayload::StreamEnded {
                stream_id: "s1".into(),
                title: "Show".into(),
                reason: "producer disconnected".into(),
            }
        );
    }
}
