// memreplay (camcorder sidecar cataloguer)
// Copyright (C) 2025 Andrew Nissen

use crate::error::ModdError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const VT_FIELDS: usize = 6;

/// One entry of a sidecar's `VTList`. The meaning of the fields is unknown,
/// so they are kept as an opaque tuple in file order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vt {
    pub field0: u32,
    pub field1: u32,
    pub field2: f64,
    pub field3: f64,
    pub field4: f64,
    pub field5: u32,
}

impl fmt::Display for Vt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}, {}, {}, {}, {}, {}}}",
            self.field0, self.field1, self.field2, self.field3, self.field4, self.field5
        )
    }
}

impl FromStr for Vt {
    type Err = ModdError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        parse_vt(line)
    }
}

/// Parse a `a:b:c:d:e:f` line. Each field runs from the previous colon to the
/// next one; anything after a sixth colon is ignored. Fewer than five
/// colons is an error.
pub fn parse_vt(line: &str) -> Result<Vt, ModdError> {
    let fields: Vec<&str> = line.trim().split(':').take(VT_FIELDS).collect();
    if fields.len() < VT_FIELDS {
        return Err(ModdError::MalformedVt {
            line: line.to_string(),
            found: fields.len(),
        });
    }

    Ok(Vt {
        field0: parse_field(line, &fields, 0)?,
        field1: parse_field(line, &fields, 1)?,
        field2: parse_field(line, &fields, 2)?,
        field3: parse_field(line, &fields, 3)?,
        field4: parse_field(line, &fields, 4)?,
        field5: parse_field(line, &fields, 5)?,
    })
}

fn parse_field<T>(line: &str, fields: &[&str], index: usize) -> Result<T, ModdError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fields[index]
        .trim()
        .parse::<T>()
        .map_err(|e| ModdError::InvalidVtField {
            line: line.to_string(),
            index,
            reason: e.to_string(),
        })
}
