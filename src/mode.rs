//! Trading mode controller.
//!
//! Holds the process-wide MANUAL/AUTO flag. Reads and writes go through an
//! atomic so the scheduler's dispatch check never blocks on a mode change
//! and never observes a torn value. Mode changes take effect at the next
//! dispatch decision; an in-flight cycle is never aborted by one.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    /// Scheduled triggers are ignored; only manual triggers run.
    Manual,
    /// Scheduled triggers dispatch cycles.
    Auto,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::Auto => "AUTO",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Mode {
    type Error = String;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "MANUAL" => Ok(Self::Manual),
            "AUTO" => Ok(Self::Auto),
            other => Err(format!("invalid mode: {other}; expected MANUAL|AUTO")),
        }
    }
}

const MODE_MANUAL: u8 = 0;
const MODE_AUTO: u8 = 1;

/// Atomic holder for the process-wide mode
pub struct ModeController {
    mode: AtomicU8,
}

impl ModeController {
    pub fn new(initial: Mode) -> Self {
        Self {
            mode: AtomicU8::new(encode(initial)),
        }
    }

    pub fn get(&self) -> Mode {
        decode(self.mode.load(Ordering::SeqCst))
    }

    /// Swap the mode, returning the previous value
    pub fn set(&self, mode: Mode) -> Mode {
        decode(self.mode.swap(encode(mode), Ordering::SeqCst))
    }
}

fn encode(mode: Mode) -> u8 {
    match mode {
        Mode::Manual => MODE_MANUAL,
        Mode::Auto => MODE_AUTO,
    }
}

fn decode(raw: u8) -> Mode {
    if raw == MODE_AUTO {
        Mode::Auto
    } else {
        Mode::Manual
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn set_returns_previous_mode() {
        let controller = ModeController::new(Mode::Manual);
        assert_eq!(controller.set(Mode::Auto), Mode::Manual);
        assert_eq!(controller.get(), Mode::Auto);
        assert_eq!(controller.set(Mode::Auto), Mode::Auto);
    }

    #[test]
    fn parse_accepts_any_case() {
        assert_eq!(Mode::try_from("auto"), Ok(Mode::Auto));
        assert_eq!(Mode::try_from(" MANUAL "), Ok(Mode::Manual));
        assert!(Mode::try_from("turbo").is_err());
    }

    #[tokio::test]
    async fn concurrent_readers_see_whole_values() {
        let controller = Arc::new(ModeController::new(Mode::Manual));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let controller = controller.clone();
            tasks.push(tokio::spawn(async move {
                let mode = if i % 2 == 0 { Mode::Auto } else { Mode::Manual };
                controller.set(mode);
                controller.get()
            }));
        }

        for task in tasks {
            let mode = task.await.unwrap();
            assert!(mode == Mode::Auto || mode == Mode::Manual);
        }
    }
}
