use chrono::{DateTime, Utc};

use crate::models::project::Pause;

/// Net elapsed whole days between `start` and `end` (or `now` while open),
/// with registered pause windows subtracted.
///
/// Each pause is clipped to `[start, ref_end]`; pauses entirely outside the
/// window contribute nothing, and an open pause runs until `now`. Overlapping
/// pauses are subtracted independently, without merging.
pub fn net_days_in_progress(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    pauses: &[Pause],
    now: DateTime<Utc>,
) -> i64 {
    let Some(start) = start else {
        return 0;
    };
    let ref_end = end.unwrap_or(now);

    let total_days = ref_end.signed_duration_since(start).num_days().max(0);

    let mut paused_days = 0;
    for pause in pauses {
        if pause.started_at > ref_end {
            continue;
        }
        let pause_end = pause.ended_at.unwrap_or(now);
        if pause_end < start {
            continue;
        }

        let clipped_start = pause.started_at.max(start);
        let clipped_end = pause_end.min(ref_end);
        if clipped_end > clipped_start {
            paused_days += clipped_end.signed_duration_since(clipped_start).num_days();
        }
    }

    (total_days - paused_days).max(0)
}
