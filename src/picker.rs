//! Interactive selection among ranked offers.
//!
//! The picker shows one offer at a time, cheapest first. Skipping past the
//! last offer wraps back to the first, so an operator may cycle indefinitely.

use std::io::{self, BufRead, Write};

use crate::display::render_offer;
use crate::marketplace::Offer;

const PROMPT: &str = "Launch this offer? [y]es / [n]ext / [q]uit: ";
const INVALID_INPUT: &str = "Invalid input. Enter 'y' to launch, 'n' for the next offer, or 'q' to quit.";

/// Operator response to a presented offer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    /// Launch the presented offer.
    Accept,
    /// Move on to the next offer.
    Skip,
    /// Stop without launching anything.
    Cancel,
    /// Unrecognised input.
    Invalid,
}

impl Decision {
    /// Interprets one line of operator input.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Self::Accept,
            "n" | "next" | "s" | "skip" => Self::Skip,
            "q" | "quit" | "c" | "cancel" => Self::Cancel,
            _ => Self::Invalid,
        }
    }
}

/// Picker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PickerState {
    /// Offer at this index is on screen.
    Presenting(usize),
    /// Offer at this index was chosen.
    Accepted(usize),
    /// The operator cancelled.
    Aborted,
}

/// Cursor over a non-empty ranked offer list.
#[derive(Debug)]
pub struct OfferPicker<'a> {
    offers: &'a [Offer],
    state: PickerState,
}

impl<'a> OfferPicker<'a> {
    /// Starts presenting the cheapest offer. Returns `None` for an empty list.
    #[must_use]
    pub const fn new(offers: &'a [Offer]) -> Option<Self> {
        if offers.is_empty() {
            return None;
        }
        Some(Self {
            offers,
            state: PickerState::Presenting(0),
        })
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> PickerState {
        self.state
    }

    /// Applies `decision`. Terminal states ignore further decisions.
    pub fn apply(&mut self, decision: Decision) -> PickerState {
        let PickerState::Presenting(index) = self.state else {
            return self.state;
        };

        self.state = match decision {
            Decision::Accept => PickerState::Accepted(index),
            Decision::Skip => {
                let next = index.saturating_add(1);
                PickerState::Presenting(if next >= self.offers.len() { 0 } else { next })
            }
            Decision::Cancel => PickerState::Aborted,
            Decision::Invalid => PickerState::Presenting(index),
        };
        self.state
    }

    /// Runs the interactive loop, rendering offers to `output` and reading one
    /// decision per line from `input`. End of input cancels.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures on either stream.
    pub fn pick(
        mut self,
        input: &mut impl BufRead,
        output: &mut impl Write,
    ) -> io::Result<Option<&'a Offer>> {
        let total = self.offers.len();
        let mut shown = None;

        loop {
            match self.state {
                PickerState::Presenting(index) => {
                    if shown != Some(index) {
                        if let Some(offer) = self.offers.get(index) {
                            render_offer(output, offer, index, total)?;
                        }
                        shown = Some(index);
                    }
                    write!(output, "{PROMPT}")?;
                    output.flush()?;

                    let mut line = String::new();
                    let decision = if input.read_line(&mut line)? == 0 {
                        writeln!(output)?;
                        Decision::Cancel
                    } else {
                        Decision::parse(&line)
                    };
                    if decision == Decision::Invalid {
                        writeln!(output, "{INVALID_INPUT}")?;
                    }
                    self.apply(decision);
                }
                PickerState::Accepted(index) => return Ok(self.offers.get(index)),
                PickerState::Aborted => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::io::Cursor;

    #[fixture]
    fn offers() -> Vec<Offer> {
        (1..=3)
            .map(|id| Offer {
                id: Some(id),
                ..Offer::default()
            })
            .collect()
    }

    #[rstest]
    #[case("y", Decision::Accept)]
    #[case(" YES \n", Decision::Accept)]
    #[case("n", Decision::Skip)]
    #[case("skip", Decision::Skip)]
    #[case("q", Decision::Cancel)]
    #[case("cancel", Decision::Cancel)]
    #[case("maybe", Decision::Invalid)]
    #[case("", Decision::Invalid)]
    fn decisions_are_parsed_case_insensitively(#[case] input: &str, #[case] expected: Decision) {
        assert_eq!(Decision::parse(input), expected);
    }

    #[rstest]
    fn empty_offer_lists_have_no_picker() {
        assert!(OfferPicker::new(&[]).is_none());
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    fn repeated_skips_wrap_in_order(#[case] len: u64) {
        let offers = (0..len)
            .map(|id| Offer {
                id: Some(id),
                ..Offer::default()
            })
            .collect::<Vec<_>>();
        let mut picker = OfferPicker::new(&offers).expect("non-empty");
        let mut visited = vec![picker.state()];

        for _ in 0..(offers.len() * 2) {
            visited.push(picker.apply(Decision::Skip));
        }

        let expected = (0..=(offers.len() * 2))
            .map(|step| PickerState::Presenting(step % offers.len()))
            .collect::<Vec<_>>();
        assert_eq!(visited, expected);
    }

    #[rstest]
    fn invalid_input_keeps_cursor(offers: Vec<Offer>) {
        let mut picker = OfferPicker::new(&offers).expect("non-empty");
        picker.apply(Decision::Skip);
        assert_eq!(picker.apply(Decision::Invalid), PickerState::Presenting(1));
    }

    #[rstest]
    fn terminal_states_are_sticky(offers: Vec<Offer>) {
        let mut picker = OfferPicker::new(&offers).expect("non-empty");
        assert_eq!(picker.apply(Decision::Cancel), PickerState::Aborted);
        assert_eq!(picker.apply(Decision::Accept), PickerState::Aborted);
        assert_eq!(picker.apply(Decision::Skip), PickerState::Aborted);
    }

    #[rstest]
    fn pick_returns_offer_after_skips_and_invalid_input(offers: Vec<Offer>) {
        let picker = OfferPicker::new(&offers).expect("non-empty");
        let mut input = Cursor::new("n\nwhat\nn\nn\ny\n");
        let mut output = Vec::new();

        let chosen = picker.pick(&mut input, &mut output).expect("in-memory IO");

        assert_eq!(chosen.and_then(|offer| offer.id), Some(1));
        let rendered = String::from_utf8(output).expect("utf8");
        assert!(rendered.contains("Invalid input"), "{rendered}");
        assert_eq!(rendered.matches("Offer 2 of 3").count(), 1, "{rendered}");
        assert_eq!(rendered.matches("Offer 1 of 3").count(), 2, "{rendered}");
    }

    #[rstest]
    #[case("q\n")]
    #[case("")]
    fn pick_cancels_on_quit_or_end_of_input(offers: Vec<Offer>, #[case] script: &str) {
        let picker = OfferPicker::new(&offers).expect("non-empty");
        let mut input = Cursor::new(script);
        let mut output = Vec::new();

        let chosen = picker.pick(&mut input, &mut output).expect("in-memory IO");

        assert!(chosen.is_none());
    }
}
