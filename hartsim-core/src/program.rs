//! Parsing of the textual program-image format.
//!
//! A program is a text file with one instruction per line. Each line holds
//! exactly 32 characters; character 0 is the most significant bit of the
//! instruction word. A `'1'` is a set bit, any other character is a clear
//! bit. Line `k` becomes the word at byte address `4 * k`.

use crate::unit;
use thiserror::Error;

/// The instruction width in bits, which is also the required line length.
pub const ILEN: usize = 32;

/// A parsed program image: the instruction words in load order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Program {
    words: Vec<u32>,
}

impl Program {
    /// Parses the textual image format. Lines of any length other than
    /// [`ILEN`] — blank lines included — are rejected.
    pub fn parse(text: &str) -> Result<Self, ProgramError> {
        let mut words = Vec::new();
        for (number, line) in text.lines().enumerate() {
            if line.len() != ILEN {
                return Err(ProgramError::BadLineLength {
                    line: number + 1,
                    length: line.len(),
                });
            }
            let word = line
                .bytes()
                .fold(0u32, |word, ch| (word << 1) | (ch == b'1') as u32);
            words.push(word);
        }
        Ok(Self { words })
    }

    /// The instruction words, in load order.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// The byte address one past the last loaded word. Execution terminates
    /// when `pc` reaches this address.
    pub fn end_address(&self) -> u32 {
        self.words.len() as u32 * unit::WORD
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ProgramError {
    #[error("line {line} is {length} characters long, expected {ILEN}")]
    BadLineLength { line: usize, length: usize },
}
