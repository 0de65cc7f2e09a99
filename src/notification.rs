use std::time::{Duration, Instant};

use iced::Color;

use crate::activity::{self, Kind as LogKind};

pub const ENTER: Duration = Duration::from_millis(300);
pub const VISIBLE_FOR: Duration = Duration::from_millis(3000);
pub const EXIT: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Info,
    Success,
    Error,
}

impl Kind {
    pub fn color(self) -> Color {
        match self {
            Kind::Success => Color::from_rgb8(0x10, 0xb9, 0x81),
            Kind::Error => Color::from_rgb8(0xef, 0x44, 0x44),
            Kind::Info => Color::from_rgb8(0x3b, 0x82, 0xf6),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Entering,
    Visible,
    Exiting,
    Detached,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub kind: Kind,
    created: Instant,
}

impl Notification {
    pub fn phase(&self, now: Instant) -> Phase {
        let age = now.saturating_duration_since(self.created);
        if age < ENTER {
            Phase::Entering
        } else if age < VISIBLE_FOR {
            Phase::Visible
        } else if age < VISIBLE_FOR + EXIT {
            Phase::Exiting
        } else {
            Phase::Detached
        }
    }

    /// Slide/fade progress in `0.0..=1.0`; 1.0 is fully shown.
    pub fn opacity(&self, now: Instant) -> f32 {
        let age = now.saturating_duration_since(self.created);
        match self.phase(now) {
            Phase::Entering => age.as_secs_f32() / ENTER.as_secs_f32(),
            Phase::Visible => 1.0,
            Phase::Exiting => {
                let into_exit = age.saturating_sub(VISIBLE_FOR);
                1.0 - into_exit.as_secs_f32() / EXIT.as_secs_f32()
            }
            Phase::Detached => 0.0,
        }
    }
}

/// Toasts currently attached to the window. Every `notify` adds one; there is
/// no dedup and no queue, overlapping toasts simply stack.
#[derive(Debug, Default)]
pub struct Notifications {
    items: Vec<Notification>,
    next_id: u64,
    desktop: bool,
}

impl Notifications {
    pub fn new(desktop: bool) -> Self {
        Notifications { items: Vec::new(), next_id: 0, desktop }
    }

    pub fn notify(&mut self, message: impl Into<String>, kind: Kind, now: Instant) -> u64 {
        let message = message.into();
        self.next_id += 1;
        let id = self.next_id;

        if self.desktop {
            show_desktop(&message);
        }

        self.items.push(Notification { id, message, kind, created: now });
        id
    }

    /// Detach every toast whose exit animation has finished.
    pub fn tick(&mut self, now: Instant) {
        self.items.retain(|n| n.phase(now) != Phase::Detached);
    }

    /// Safe to call for a toast that is already gone.
    pub fn dismiss(&mut self, id: u64) {
        self.items.retain(|n| n.id != id);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }
}

fn show_desktop(message: &str) {
    let result = notify_rust::Notification::new()
        .summary("Mail Oracle")
        .body(message)
        .show();

    if let Err(e) = result {
        activity::log_with(LogKind::Warning, format!("Desktop notification failed: {}", e));
    }
}
