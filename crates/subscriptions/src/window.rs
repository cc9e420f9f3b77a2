//! "Last two recurrences" window.
//!
//! Only the two highest-numbered recurrences of a subscription are relevant to
//! current inventory; anything older is either paid or superseded.

/// The (at most two) highest recurrence numbers seen in a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecurrenceWindow {
    highest: Option<u32>,
    second: Option<u32>,
}

impl RecurrenceWindow {
    pub fn contains(&self, recurrence: u32) -> bool {
        self.highest == Some(recurrence) || self.second == Some(recurrence)
    }

    pub fn members(&self) -> impl Iterator<Item = u32> {
        self.highest.into_iter().chain(self.second)
    }

    pub fn is_empty(&self) -> bool {
        self.highest.is_none()
    }
}

/// Build the window from recurrence numbers. Duplicates count once.
pub fn recurrence_window(numbers: impl IntoIterator<Item = u32>) -> RecurrenceWindow {
    let mut window = RecurrenceWindow::default();
    for n in numbers {
        match window.highest {
            None => window.highest = Some(n),
            Some(h) if n == h => {}
            Some(h) if n > h => {
                window.second = Some(h);
                window.highest = Some(n);
            }
            Some(_) => match window.second {
                Some(s) if n <= s => {}
                _ => window.second = Some(n),
            },
        }
    }
    window
}
