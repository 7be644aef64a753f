//! Data logger XML configuration
//!
//! ```xml
//! <config>
//!   <list><group><name>boilers</name><item>c1000</item></group></list>
//!   <sample><task><period>15m</period><variable>{boilers}.temp</variable></task></sample>
//!   <alarm><task><period>10s</period><variable>c1000.temp</variable><hilimit>90</hilimit></task></alarm>
//! </config>
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use super::config::{
    AlarmPriority, AlarmRange, AlarmTaskConfig, LoggerConfig, MeasurementTaskConfig, Target, TargetContext, TaskType,
};
use crate::error::DataLoggerConfigError;

type ParseResult<T> = std::result::Result<T, DataLoggerConfigError>;

/// Minimal element tree; attributes are not used by the format
#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

fn read_tree(text: &str) -> ParseResult<Element> {
    let xml_error = |e: &dyn std::fmt::Display| DataLoggerConfigError::Xml(e.to_string());

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    loop {
        match reader.read_event().map_err(|e| xml_error(&e))? {
            Event::Start(start) => stack.push(Element {
                name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
                ..Default::default()
            }),
            Event::Empty(empty) => {
                let element = Element {
                    name: String::from_utf8_lossy(empty.name().as_ref()).into_owned(),
                    ..Default::default()
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            },
            Event::Text(content) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&content.unescape().map_err(|e| xml_error(&e))?);
                }
            },
            Event::CData(content) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&content.into_inner()));
                }
            },
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    return Err(DataLoggerConfigError::Xml("unbalanced end tag".to_string()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            },
            Event::Eof => return Err(DataLoggerConfigError::Xml("no root element".to_string())),
            _ => {},
        }
    }
}

pub fn parse_logger_config(text: &str) -> ParseResult<LoggerConfig> {
    let root = read_tree(text)?;
    let mut config = LoggerConfig::default();

    for element in &root.children {
        match element.name.as_str() {
            "list" => {
                for group in &element.children {
                    if group.name != "group" {
                        return Err(DataLoggerConfigError::UnexpectedTag(group.name.clone()));
                    }
                    let (name, nads) = parse_group(group)?;
                    config.groups.insert(name, nads);
                }
            },
            "sample" => {
                for task in tasks_of(element)? {
                    config.measurement_tasks.push(parse_measurement_task(task)?);
                }
            },
            "alarm" | "event" => {
                let task_type = if element.name == "alarm" {
                    TaskType::Alarm
                } else {
                    TaskType::Event
                };
                for task in tasks_of(element)? {
                    config.alarm_tasks.push(parse_alarm_task(task, task_type)?);
                }
            },
            other => return Err(DataLoggerConfigError::UnexpectedTag(other.to_string())),
        }
    }

    Ok(config)
}

fn tasks_of(section: &Element) -> ParseResult<impl Iterator<Item = &Element>> {
    if let Some(other) = section.children.iter().find(|c| c.name != "task") {
        return Err(DataLoggerConfigError::UnexpectedTag(other.name.clone()));
    }
    Ok(section.children.iter())
}

fn parse_group(group: &Element) -> ParseResult<(String, Vec<u32>)> {
    let mut name = None;
    let mut nads = Vec::new();
    for element in &group.children {
        match element.name.as_str() {
            "name" => name = Some(element.text.clone()),
            "item" => nads.push(parse_plc_name(&element.text)?),
            _ => {},
        }
    }
    let name = name.ok_or_else(|| DataLoggerConfigError::MissingTag("name".to_string()))?;
    Ok((name, nads))
}

fn parse_plc_name(raw: &str) -> ParseResult<u32> {
    raw.strip_prefix('c')
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| invalid("item", raw))
}

fn parse_measurement_task(task: &Element) -> ParseResult<MeasurementTaskConfig> {
    let mut period = None;
    let mut targets = Vec::new();
    let mut enabled = true;

    for element in &task.children {
        match element.name.as_str() {
            "period" => period = Some(parse_period(&element.text)?),
            "variable" => targets.push(parse_target(&element.text)?),
            "enabled" => enabled = parse_enabled(&element.text)?,
            other => return Err(DataLoggerConfigError::UnexpectedTag(other.to_string())),
        }
    }

    Ok(MeasurementTaskConfig {
        period: period.ok_or_else(|| DataLoggerConfigError::MissingTag("period".to_string()))?,
        targets,
        enabled,
    })
}

fn parse_alarm_task(task: &Element, task_type: TaskType) -> ParseResult<AlarmTaskConfig> {
    let mut period = None;
    let mut targets = Vec::new();
    let mut enabled = true;
    let mut alarm_class = String::new();
    let mut priority = AlarmPriority::Medium;
    let mut message = String::new();
    let mut low = None;
    let mut high = None;
    let mut hysteresis = None;

    for element in &task.children {
        let text = element.text.as_str();
        match element.name.as_str() {
            "period" => period = Some(parse_period(text)?),
            "variable" => targets.push(parse_target(text)?),
            "enabled" => enabled = parse_enabled(text)?,
            "class" => alarm_class = text.to_string(),
            "priority" => priority = AlarmPriority::parse(text).ok_or_else(|| invalid("priority", text))?,
            "message" => message = text.to_string(),
            "lolimit" => low = Some(parse_number("lolimit", text)?),
            "hilimit" => high = Some(parse_number("hilimit", text)?),
            "hysteresis" => hysteresis = Some(parse_number("hysteresis", text)?),
            other => return Err(DataLoggerConfigError::UnexpectedTag(other.to_string())),
        }
    }

    let range = (low.is_some() || high.is_some()).then(|| AlarmRange {
        low: low.unwrap_or(f64::NEG_INFINITY),
        high: high.unwrap_or(f64::INFINITY),
        hysteresis: hysteresis.unwrap_or(0.0),
    });

    Ok(AlarmTaskConfig {
        period: period.ok_or_else(|| DataLoggerConfigError::MissingTag("period".to_string()))?,
        targets,
        enabled,
        alarm_class,
        priority,
        range,
        message,
        task_type,
    })
}

/// `<digits><h|m|s>`, never zero
fn parse_period(raw: &str) -> ParseResult<Duration> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let captures = PATTERN
        .get_or_init(|| Regex::new(r"^(\d+)(\w+)$").ok())
        .as_ref()
        .and_then(|re| re.captures(raw))
        .ok_or_else(|| invalid("period", raw))?;

    let value: u64 = captures[1].parse().map_err(|_| invalid("period", raw))?;
    let seconds = match &captures[2] {
        "h" => value.checked_mul(3600),
        "m" => value.checked_mul(60),
        "s" => Some(value),
        _ => None,
    }
    .filter(|s| *s > 0)
    .ok_or_else(|| invalid("period", raw))?;

    Ok(Duration::from_secs(seconds))
}

fn parse_target(raw: &str) -> ParseResult<Target> {
    static PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    let (by_nad, by_group) = PATTERNS
        .get_or_init(|| {
            let by_nad = Regex::new(r"^c(\d+)\.(\w+(?:\[\d+\])?)$").ok()?;
            let by_group = Regex::new(r"^\{(\w+)\}\.(\w+(?:\[\d+\])?)$").ok()?;
            Some((by_nad, by_group))
        })
        .as_ref()
        .ok_or_else(|| invalid("variable", raw))?;

    if let Some(captures) = by_nad.captures(raw) {
        let nad = captures[1].parse().map_err(|_| invalid("variable", raw))?;
        return Ok(Target {
            context: TargetContext::Nad(nad),
            variable: captures[2].to_string(),
        });
    }
    if let Some(captures) = by_group.captures(raw) {
        return Ok(Target {
            context: TargetContext::Group(captures[1].to_string()),
            variable: captures[2].to_string(),
        });
    }
    Err(invalid("variable", raw))
}

fn parse_enabled(raw: &str) -> ParseResult<bool> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid("enabled", raw)),
    }
}

fn parse_number(tag: &str, raw: &str) -> ParseResult<f64> {
    raw.trim().parse().map_err(|_| invalid(tag, raw))
}

fn invalid(tag: &str, value: &str) -> DataLoggerConfigError {
    DataLoggerConfigError::InvalidValue(tag.to_string(), value.to_string())
}
