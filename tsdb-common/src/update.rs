//! # Order-Book Updates
//!
//! Purpose: Represent one L2 order-book update and render it as the
//! comma-separated record the server parses for `ADD` and `BULKADD`.
//!
//! ## Record Layout
//!
//! ```text
//! <ts>, <seq>, <t|f>, <t|f>, <price>, <size>;
//!        is_trade ^    ^ is_bid
//! ```
//!
//! Prices and sizes always carry a decimal point (`5.0`, not `5`) so the
//! rendered text is stable regardless of the value's magnitude.
//!
//! ## JSON Rows
//!
//! `GET ... AS JSON` renders `ts` as fractional seconds (`20000.001` for
//! `ts = 20000001`). The serde impls use that form so server rows decode
//! straight into `Update`.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};

/// One L2 order-book update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Timestamp in milliseconds; seconds in JSON.
    #[serde(with = "ts_seconds")]
    pub ts: u64,
    /// Exchange sequence number.
    pub seq: u32,
    /// True when the update is a trade rather than a book change.
    pub is_trade: bool,
    /// True for the bid side, false for the ask side.
    pub is_bid: bool,
    /// Price level.
    pub price: f32,
    /// Size at the price level.
    pub size: f32,
}

impl Update {
    /// Renders the record line, including the trailing `;`.
    pub fn to_record(&self) -> String {
        let mut out = String::with_capacity(48);
        // Writing into a String cannot fail.
        let _ = self.write_record(&mut out);
        out
    }

    /// Writes the record line into any `fmt::Write` sink.
    pub fn write_record<W: Write>(&self, out: &mut W) -> fmt::Result {
        write!(
            out,
            "{}, {}, {}, {}, ",
            self.ts,
            self.seq,
            flag(self.is_trade),
            flag(self.is_bid)
        )?;
        write_decimal(out, self.price)?;
        out.write_str(", ")?;
        write_decimal(out, self.size)?;
        out.write_char(';')
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_record(f)
    }
}

fn flag(value: bool) -> char {
    if value {
        't'
    } else {
        'f'
    }
}

// Shortest round-trip form, with ".0" appended to integral values.
fn write_decimal<W: Write>(out: &mut W, value: f32) -> fmt::Result {
    let text = value.to_string();
    out.write_str(&text)?;
    if value.is_finite() && !text.contains('.') {
        out.write_str(".0")?;
    }
    Ok(())
}

mod ts_seconds {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(ts: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(*ts as f64 / 1000.0)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(D::Error::custom(format!("invalid timestamp {}", secs)));
        }
        Ok((secs * 1000.0).round() as u64)
    }
}
