//! Fixed-window per-user rate ceilings.
//!
//! Two classes: writes (event ingestion, 60/min default) and reads (600/min
//! default). Windows are minute-aligned; state lives in process memory, which
//! matches the single-process deployment the store targets.

use std::{collections::HashMap, sync::Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitClass {
  Read,
  Write,
}

pub struct RateLimiter {
  reads_per_minute:  u32,
  writes_per_minute: u32,
  windows:           Mutex<HashMap<(String, LimitClass), (i64, u32)>>,
}

impl RateLimiter {
  pub fn new(reads_per_minute: u32, writes_per_minute: u32) -> Self {
    Self {
      reads_per_minute,
      writes_per_minute,
      windows: Mutex::new(HashMap::new()),
    }
  }

  /// Record one request and report whether it is within the ceiling.
  /// A ceiling of zero disables the class entirely.
  pub fn check(&self, user_id: &str, class: LimitClass, now_ms: i64) -> bool {
    let limit = match class {
      LimitClass::Read => self.reads_per_minute,
      LimitClass::Write => self.writes_per_minute,
    };
    if limit == 0 {
      return true;
    }

    let window = now_ms.div_euclid(60_000);
    let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
    let entry = windows
      .entry((user_id.to_string(), class))
      .or_insert((window, 0));
    if entry.0 != window {
      *entry = (window, 0);
    }
    entry.1 += 1;
    entry.1 <= limit
  }
}
