//! Server time in Unix-epoch milliseconds, plus client-skew clamping.
//!
//! All persisted timestamps in triagedeck are epoch milliseconds. The server
//! clock is monotonic non-decreasing within a process: a wall-clock step
//! backwards (NTP correction) never produces a `now_ms()` smaller than one
//! already handed out.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

static LAST_MS: AtomicI64 = AtomicI64::new(0);

/// Current server time in Unix-epoch milliseconds, monotonic non-decreasing.
pub fn now_ms() -> i64 {
  let wall = Utc::now().timestamp_millis();
  let prev = LAST_MS.fetch_max(wall, Ordering::Relaxed);
  wall.max(prev)
}

// ─── Skew window ─────────────────────────────────────────────────────────────

/// A symmetric interval around server time to which client timestamps are
/// clamped before they participate in winner ordering.
#[derive(Debug, Clone, Copy)]
pub struct SkewWindow {
  half_width_ms: i64,
}

impl SkewWindow {
  /// Default half-width: ±24 hours.
  pub const DEFAULT_MS: i64 = 24 * 60 * 60 * 1000;

  pub fn new(half_width_ms: i64) -> Self {
    Self {
      half_width_ms: half_width_ms.max(0),
    }
  }

  pub fn half_width_ms(&self) -> i64 { self.half_width_ms }

  /// Clamp `ts_client` into `[now - W, now + W]`.
  pub fn clamp(&self, ts_client: i64, now: i64) -> i64 {
    ts_client.clamp(now - self.half_width_ms, now + self.half_width_ms)
  }
}

impl Default for SkewWindow {
  fn default() -> Self { Self::new(Self::DEFAULT_MS) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn now_ms_is_monotonic() {
    let a = now_ms();
    let b = now_ms();
    assert!(b >= a);
  }

  #[test]
  fn clamp_inside_window_is_identity() {
    let w = SkewWindow::default();
    let now = 1_000_000_000_000;
    assert_eq!(w.clamp(now - 1, now), now - 1);
    assert_eq!(w.clamp(now, now), now);
    assert_eq!(w.clamp(now + 1, now), now + 1);
  }

  #[test]
  fn clamp_far_past_pins_to_lower_bound() {
    let w = SkewWindow::default();
    let now = 1_000_000_000_000;
    assert_eq!(w.clamp(0, now), now - 86_400_000);
  }

  #[test]
  fn clamp_far_future_pins_to_upper_bound() {
    let w = SkewWindow::default();
    let now = 1_000_000_000_000;
    assert_eq!(w.clamp(i64::MAX, now), now + 86_400_000);
  }

  #[test]
  fn clamped_value_stays_within_window() {
    let w = SkewWindow::new(5_000);
    let now = 123_456_789;
    for ts in [i64::MIN, -1, 0, now, i64::MAX] {
      let eff = w.clamp(ts, now);
      assert!((eff - now).abs() <= 5_000);
    }
  }
}
