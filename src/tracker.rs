//! Per-packet identity used to correlate log lines and to link replies to
//! the inbound packet that caused them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static RX_SERIAL: AtomicU64 = AtomicU64::new(0);
static TX_SERIAL: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Rx => "RX",
            Direction::Tx => "TX",
        }
    }
}

/// Serial identity of one packet. Outbound packets caused by an inbound one
/// carry the parent serial so both ends of an exchange share a log key.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tracker {
    dir: Direction,
    serial: u64,
    echo: Option<(Direction, u64)>,
}

impl Tracker {
    pub fn new(dir: Direction) -> Tracker {
        let counter = match dir {
            Direction::Rx => &RX_SERIAL,
            Direction::Tx => &TX_SERIAL,
        };
        Tracker {
            dir,
            serial: counter.fetch_add(1, Ordering::Relaxed),
            echo: None,
        }
    }

    /// Fresh serial linked to the packet that caused this one.
    pub fn with_echo(dir: Direction, parent: &Tracker) -> Tracker {
        let mut tracker = Tracker::new(dir);
        tracker.echo = Some((parent.dir, parent.serial));
        tracker
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn echo(&self) -> Option<(Direction, u64)> {
        self.echo
    }
}

impl fmt::Display for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:08x}", self.dir.label(), self.serial)?;
        if let Some((dir, serial)) = self.echo {
            write!(f, " ({}/{:08x})", dir.label(), serial)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serials_are_unique() {
        let a = Tracker::new(Direction::Tx);
        let b = Tracker::new(Direction::Tx);
        assert_ne!(a.serial(), b.serial());
    }

    #[test]
    fn echo_links_parent_serial() {
        let rx = Tracker::new(Direction::Rx);
        let tx = Tracker::with_echo(Direction::Tx, &rx);
        assert_eq!(tx.echo(), Some((Direction::Rx, rx.serial())));
        let text = tx.to_string();
        assert!(text.starts_with("TX/"));
        assert!(text.contains("(RX/"));
    }
}
