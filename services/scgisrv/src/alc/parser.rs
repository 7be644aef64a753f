//! Allocation list text format
//!
//! ```text
//! ; addr  id    array offset size scope  type name               description
//! 0050    00000 1     0      1    global bit  lc00_general_error Combined system error
//! ```
//!
//! Address and id are hex. Array entries expand into `name[i]`.

use std::sync::OnceLock;

use regex::Regex;

use super::var_info::{Alc, DataType, VarInfo};
use crate::error::{Result, ScgiSrvError};

fn line_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^(\w*)\s*(\w*)\s*(\w*)\s*(\w*)\s*(\w*)\s*(\w*)\s*(\w*)\s*([\w.]*)\s*(.*)",
            )
        })
        .as_ref()
        .map_err(|e| ScgiSrvError::internal(format!("alc pattern: {e}")))
}

pub fn parse(text: &str) -> Result<Alc> {
    let pattern = line_pattern()?;
    let mut vars = Vec::new();
    for (number, line) in text.lines().enumerate() {
        parse_line(pattern, line, &mut vars)
            .map_err(|e| ScgiSrvError::UnexpectedValue(format!("alc line {}: {}", number + 1, e)))?;
    }
    Ok(vars.into_iter().collect())
}

fn parse_line(pattern: &Regex, line: &str, out: &mut Vec<VarInfo>) -> std::result::Result<(), String> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with(';') {
        return Ok(());
    }

    let caps = pattern
        .captures(line)
        .ok_or_else(|| format!("unparsable \"{line}\""))?;
    let group = |i: usize| caps.get(i).map_or("", |m| m.as_str());

    let hex = |i: usize| {
        u32::from_str_radix(group(i), 16).map_err(|_| format!("invalid hex \"{}\"", group(i)))
    };
    let dec = |i: usize| {
        group(i)
            .parse::<u32>()
            .map_err(|_| format!("invalid number \"{}\"", group(i)))
    };

    let address = hex(1)?;
    let id = hex(2)?;
    let array_size = dec(3)?;
    let offset = dec(4)?;
    let declared_size = dec(5)? as usize;
    let scope = group(6).to_string();
    let data_type = DataType::from_name(group(7));
    let name = group(8);
    let description = group(9).to_string();

    // timers and counters carry their field offset
    let address = address + offset;
    let size = data_type.size().unwrap_or(declared_size);
    let is_array = array_size > 1;

    let entry = |name: String, address: u32| VarInfo {
        id,
        name,
        is_array,
        array_size,
        address,
        offset,
        size,
        scope: scope.clone(),
        data_type,
        description: description.clone(),
    };

    if is_array {
        for i in 0..array_size {
            out.push(entry(format!("{name}[{i}]"), address + i * size as u32));
        }
    } else {
        out.push(entry(name.to_string(), address));
    }
    Ok(())
}
