use std::{fmt, str::FromStr};

const CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

/// A ledger account/table name: up to 13 characters packed into a `u64`.
///
/// The first 12 characters take 5 bits each (high bits first), the 13th takes the low 4 bits.
/// Trailing `.` characters are not significant and are not rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(pub u64);

impl Name {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Name {
    fn from(value: u64) -> Self {
        Name(value)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = [b'.'; 13];
        let mut tmp = self.0;
        for i in 0..13 {
            let (mask, shift) = if i == 0 { (0x0f, 4) } else { (0x1f, 5) };
            chars[12 - i] = CHARMAP[(tmp & mask) as usize];
            tmp >>= shift;
        }
        let end = chars.iter().rposition(|c| *c != b'.').map_or(0, |pos| pos + 1);
        // CHARMAP is ASCII
        f.write_str(std::str::from_utf8(&chars[..end]).map_err(|_| fmt::Error)?)
    }
}

/// Error for strings that cannot be packed into a [`Name`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseNameError {
    #[error("name '{0}' is longer than 13 characters")]
    TooLong(String),
    #[error("name '{name}' contains invalid character '{character}'")]
    InvalidCharacter { name: String, character: char },
}

impl FromStr for Name {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > 13 {
            return Err(ParseNameError::TooLong(s.to_string()));
        }
        let mut value = 0u64;
        for (i, c) in s.chars().enumerate() {
            let symbol = match c {
                '.' => 0,
                '1'..='5' => c as u64 - '1' as u64 + 1,
                'a'..='z' => c as u64 - 'a' as u64 + 6,
                _ => {
                    return Err(ParseNameError::InvalidCharacter {
                        name: s.to_string(),
                        character: c,
                    });
                }
            };
            if i < 12 {
                value |= symbol << (64 - 5 * (i + 1));
            } else if symbol > 0x0f {
                // the 13th character only has 4 bits
                return Err(ParseNameError::InvalidCharacter {
                    name: s.to_string(),
                    character: c,
                });
            } else {
                value |= symbol;
            }
        }
        Ok(Name(value))
    }
}
