//! XML reply body
//!
//! ```text
//! <?xml version="1.0" encoding="ISO-8859-1"?><data><var><name>c1000.a</name>
//! <value>1</value><description>...</description><error_code>2</error_code></var></data>
//! ```

use std::fmt::Display;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{Result, ScgiSrvError};
use crate::rw::{Code, RResponse, ResponseValue};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>"#;

pub fn responses_to_xml(responses: &[RResponse], reply_with_descriptions: bool) -> Result<String> {
    let placeholder = [RResponse::placeholder()];
    let responses = if responses.is_empty() {
        &placeholder[..]
    } else {
        responses
    };

    let mut writer = Writer::new(Vec::new());
    start(&mut writer, "data")?;
    for response in responses {
        start(&mut writer, "var")?;
        element(&mut writer, "name", &response.name)?;

        match &response.value {
            ResponseValue::List(items) => {
                start(&mut writer, "value")?;
                for item in items {
                    element(&mut writer, "item", item)?;
                }
                end(&mut writer, "value")?;
            },
            ResponseValue::Text(text) => {
                let value = if response.valid { text.as_str() } else { "?" };
                element(&mut writer, "value", value)?;
            },
        }

        if reply_with_descriptions {
            element(&mut writer, "description", &response.description)?;
        }
        if response.code != Code::NoError {
            element(&mut writer, "error_code", &(response.code as i32).to_string())?;
        }
        end(&mut writer, "var")?;
    }
    end(&mut writer, "data")?;

    let body = String::from_utf8(writer.into_inner())
        .map_err(|e| ScgiSrvError::internal(format!("xml: {e}")))?;
    Ok(format!("{XML_DECLARATION}{body}"))
}

/// ISO-8859-1 bytes; characters outside it become character references
pub fn to_latin1(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        match u8::try_from(u32::from(c)) {
            Ok(b) => bytes.push(b),
            Err(_) => bytes.extend_from_slice(format!("&#{};", u32::from(c)).as_bytes()),
        }
    }
    bytes
}

fn xml_error(e: impl Display) -> ScgiSrvError {
    ScgiSrvError::internal(format!("xml: {e}"))
}

fn start(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_error)
}

fn end(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_error)
}

fn element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    start(writer, name)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_error)?;
    end(writer, name)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::rw::RwRequest;

    #[test]
    fn test_value_and_description() {
        let request = RwRequest::write("c1000.lc00_qx00", "1").unwrap();
        let xml = responses_to_xml(&[RResponse::ok(&request, "1", "Output 0")], true).unwrap();
        assert_eq!(
            xml,
            concat!(
                r#"<?xml version="1.0" encoding="ISO-8859-1"?>"#,
                "<data><var><name>c1000.lc00_qx00</name><value>1</value>",
                "<description>Output 0</description></var></data>"
            )
        );
    }

    #[test]
    fn test_invalid_value_and_error_code() {
        let request = RwRequest::read("c5.missing").unwrap();
        let xml = responses_to_xml(&[RResponse::error(&request, Code::Timeout)], false).unwrap();
        assert!(xml.contains("<name>c5.missing</name><value>?</value><error_code>1</error_code>"));
        assert!(!xml.contains("<description>"));
    }

    #[test]
    fn test_list_items_are_escaped() {
        let request = RwRequest::read("sys.nad_list").unwrap();
        let items = vec!["1000".to_string(), "a<b".to_string()];
        let xml = responses_to_xml(&[RResponse::ok(&request, items, "")], false).unwrap();
        assert!(xml.contains("<value><item>1000</item><item>a&lt;b</item></value>"));
    }

    #[test]
    fn test_empty_reply_gets_placeholder() {
        let xml = responses_to_xml(&[], false).unwrap();
        assert!(xml.ends_with("<data><var><name></name><value>?</value><error_code>3</error_code></var></data>"));
    }

    #[test]
    fn test_latin1() {
        assert_eq!(to_latin1("°C"), vec![0xB0, b'C']);
        assert_eq!(to_latin1("€"), b"&#8364;".to_vec());
    }
}
