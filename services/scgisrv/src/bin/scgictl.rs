//! Command line SCGI client
//!
//! Sends one query to a running gateway and prints the tags it returns.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use scgisrv::utils::text::latin1_decode;

/// Query tags through the SCGI gateway
#[derive(Parser, Debug)]
#[command(name = "scgictl", version, about, long_about = None)]
struct Cli {
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(short, long, default_value_t = 4000)]
    port: u16,

    /// Print the reply as JSON
    #[arg(long)]
    json: bool,

    /// Query string, e.g. "c1000.counter&c1000.lc00_qx00=1"
    query: String,
}

#[derive(Debug, Default, Serialize, PartialEq)]
struct TagReply {
    name: String,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut stream = TcpStream::connect((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("connect to {}:{}", cli.host, cli.port))?;
    stream
        .write_all(format!("GET ?{} HTTP/1.1\r\n\r\n", cli.query).as_bytes())
        .await?;
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;

    let tags = parse_reply(&latin1_decode(&raw))?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
        return Ok(());
    }
    for tag in tags {
        println!("Name: {}", tag.name);
        println!("Value: {}", tag.value);
        if let Some(description) = tag.description {
            println!("Description: {}", description);
        }
        if let Some(code) = tag.error_code {
            println!("Error code: {}", code);
        }
        println!();
    }
    Ok(())
}

fn parse_reply(reply: &str) -> Result<Vec<TagReply>> {
    let (status, body) = reply.split_once("\r\n\r\n").unwrap_or((reply, ""));
    if !status.starts_with("HTTP/1.1 200") {
        bail!("gateway replied \"{}\"", status.trim());
    }
    parse_tags(body)
}

fn parse_tags(xml: &str) -> Result<Vec<TagReply>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut tags = Vec::new();
    let mut current: Option<TagReply> = None;
    let mut field = String::new();
    let mut items: Vec<String> = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                field = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                if field == "var" {
                    current = Some(TagReply::default());
                    items.clear();
                }
            },
            Event::Text(text) => {
                let text = text.unescape()?.into_owned();
                let Some(tag) = current.as_mut() else {
                    continue;
                };
                match field.as_str() {
                    "name" => tag.name = text,
                    "value" => tag.value = text,
                    "item" => items.push(text),
                    "description" => tag.description = Some(text),
                    "error_code" => {
                        tag.error_code = Some(
                            text.parse()
                                .map_err(|_| anyhow!("invalid error code \"{}\"", text))?,
                        );
                    },
                    _ => {},
                }
            },
            Event::End(end) if end.name().as_ref() == b"var" => {
                if let Some(mut tag) = current.take() {
                    if !items.is_empty() {
                        tag.value = items.join("\n");
                    }
                    tags.push(tag);
                }
            },
            Event::Eof => break,
            _ => {},
        }
    }
    Ok(tags)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply() {
        let reply = "HTTP/1.1 200 OK\r\n\r\n<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
            <data><var><name>c1000.counter</name><value>42</value>\
            <description>Event counter</description></var>\
            <var><name>c1000.x</name><value>?</value><error_code>2</error_code></var></data>";
        let tags = parse_reply(reply).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].value, "42");
        assert_eq!(tags[0].description.as_deref(), Some("Event counter"));
        assert_eq!(tags[1].error_code, Some(2));
        assert_eq!(tags[1].description, None);
    }

    #[test]
    fn test_list_values_are_joined() {
        let xml = "<data><var><name>sys.nad_list</name><value><item>1000</item>\
            <item>1001</item></value></var></data>";
        let tags = parse_tags(xml).unwrap();
        assert_eq!(tags[0].value, "1000\n1001");
    }

    #[test]
    fn test_error_status() {
        let err = parse_reply("HTTP/1.1 400 Bad Request").unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
