use std::cell::Cell;
use std::io::{self, Write};
use std::time::Instant;

/// Stderr progress lines prefixed with elapsed time. Progress for one label is printed at
/// most once per `step_pct` percent, plus always for the first and last item.
pub struct ConsoleProgress {
    enabled: bool,
    step_pct: u32,
    t0: Instant,
    last_pct: Cell<Option<u32>>,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            step_pct: 5,
            t0: Instant::now(),
            last_pct: Cell::new(None),
        }
    }

    pub fn silent() -> Self {
        Self::new(false)
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {}", msg.as_ref());
    }

    pub fn progress(&self, label: &str, current: usize, total: usize) {
        if !self.enabled {
            return;
        }
        let total = total.max(1);
        let current = current.min(total);
        let pct = (current * 100 / total) as u32;
        if current == 1 {
            self.last_pct.set(None);
        }
        let due = match self.last_pct.get() {
            None => true,
            Some(last) => current == total || pct >= last + self.step_pct,
        };
        if !due {
            return;
        }
        self.last_pct.set(Some(pct));
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {label} {current}/{total} ({pct:3}%)");
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::fmt_elapsed;

    #[test]
    fn elapsed_formatting() {
        assert_eq!(fmt_elapsed(5.4), "00:05");
        assert_eq!(fmt_elapsed(3725.0), "01:02:05");
    }
}
