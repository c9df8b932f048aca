//! ITS timestamps and Generation Delta Time.
//!
//! An ITS timestamp counts milliseconds since 2004-01-01T00:00:00Z. CAMs only
//! carry the low 16 bits of it (the Generation Delta Time), so the receiver
//! recovers the absolute time by assuming the message was stamped within the
//! current 65536 ms window.

use std::time::{SystemTime, UNIX_EPOCH};

/// 2004-01-01T00:00:00Z expressed in Unix milliseconds.
pub const ITS_EPOCH_UNIX_MS: u64 = 1_072_915_200_000;

/// Period of the Generation Delta Time counter.
pub const GDT_PERIOD: u64 = 65_536;

/// Convert Unix milliseconds into an ITS timestamp (saturates at 0 before 2004).
pub fn its_from_unix_millis(unix_ms: u64) -> u64 {
    unix_ms.saturating_sub(ITS_EPOCH_UNIX_MS)
}

/// Current ITS timestamp from the system wall clock. Leap seconds are ignored.
pub fn now_its() -> u64 {
    let unix_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    its_from_unix_millis(unix_ms)
}

/// Generation Delta Time of an ITS timestamp.
pub fn gdt_from_its(ts: u64) -> u16 {
    (ts % GDT_PERIOD) as u16
}

/// Recover the ITS timestamp of a GDT received just now.
///
/// Wrong by a multiple of 65536 ms if the GDT was stamped more than one
/// period before this call. No error is raised in that case.
pub fn its_from_gdt(gdt: u16) -> u64 {
    its_from_gdt_at(gdt, now_its())
}

/// Same as [`its_from_gdt`] against an explicit `now`.
pub fn its_from_gdt_at(gdt: u16, now: u64) -> u64 {
    // round down to the start of the current window
    let base = now - now % GDT_PERIOD;
    base + gdt as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_offset() {
        assert_eq!(its_from_unix_millis(ITS_EPOCH_UNIX_MS), 0);
        assert_eq!(its_from_unix_millis(ITS_EPOCH_UNIX_MS + 1500), 1500);
        assert_eq!(its_from_unix_millis(0), 0);
    }

    #[test]
    fn test_now_is_after_2020() {
        // 2020-01-01 is 504_921_600_000 ms after the ITS epoch
        assert!(now_its() > 504_921_600_000);
    }

    #[test]
    fn test_gdt_wraps() {
        assert_eq!(gdt_from_its(0), 0);
        assert_eq!(gdt_from_its(65_535), 65_535);
        assert_eq!(gdt_from_its(65_536), 0);
        assert_eq!(gdt_from_its(65_536 * 7 + 42), 42);
    }

    #[test]
    fn test_its_from_gdt_same_window() {
        let now = 65_536 * 1000 + 30_000;
        assert_eq!(its_from_gdt_at(29_000, now), now - 1000);
        assert_eq!(its_from_gdt_at(gdt_from_its(now), now), now);
    }

    #[test]
    fn test_its_from_gdt_stale_is_off_by_period() {
        // stamped in the previous window: result lands one period late
        let now = 65_536 * 1000 + 1000;
        let stamped = now - 5000;
        let recovered = its_from_gdt_at(gdt_from_its(stamped), now);
        assert_eq!(recovered, stamped + GDT_PERIOD);
    }

    #[test]
    fn test_its_from_gdt_uses_clock() {
        let now = now_its();
        let ts = its_from_gdt(gdt_from_its(now));
        // ts lies in the window of the clock read inside its_from_gdt
        assert!(ts + GDT_PERIOD > now);
        assert!(ts <= now + GDT_PERIOD);
    }
}
