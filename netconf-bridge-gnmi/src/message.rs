//! NETCONF wire messages: classification, request parsing and reply emission.
//!
//! Inbound messages are classified by their actual root and operation
//! elements rather than by substring scanning, so payload content can never
//! change how a message is dispatched.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// NETCONF base namespace.
pub const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.1";

/// Internal marker passed through the dispatcher to build the server hello.
pub const REQUEST_HELLO: &[u8] = b"<request-hello/>";

/// XML-level parse failures.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("missing <{0}> element")]
    MissingElement(&'static str),
}

fn xml_err(e: impl std::fmt::Display) -> ParseError {
    ParseError::Xml(e.to_string())
}

/// The operation a raw inbound message maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Internal marker requesting the server hello.
    RequestHello,
    /// The peer's own hello; absorbed without a reply.
    PeerHello,
    GetConfig,
    EditConfig,
    CloseSession,
    KillSession,
    Unknown,
}

/// A parsed `<get-config>` request.
#[derive(Debug, Clone)]
pub struct GetConfigRequest {
    pub message_id: String,
    pub filter: Filter,
}

/// The `<filter>` element of a `<get-config>` request.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub filter_type: String,
    pub xmlns: String,
    pub select: String,
}

/// A parsed `<edit-config>` request. `config` holds the raw inner XML of the
/// `<config>` element.
#[derive(Debug, Clone)]
pub struct EditConfigRequest {
    pub message_id: String,
    pub default_operation: Option<String>,
    pub config: String,
}

/// A single `<rpc-error>` entry of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub error_type: String,
    pub message: String,
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr(e: &BytesStart, name: &str) -> Result<Option<String>, ParseError> {
    match e.try_get_attribute(name).map_err(xml_err)? {
        Some(a) => Ok(Some(a.unescape_value().map_err(xml_err)?.into_owned())),
        None => Ok(None),
    }
}

fn first_element(reader: &mut Reader<&[u8]>) -> Option<String> {
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => return Some(local_name(&e)),
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Classify a raw message by root element, descending into `<rpc>` to find
/// the operation element.
pub fn classify(raw: &str) -> MessageKind {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let root = match first_element(&mut reader) {
        Some(name) => name,
        None => return MessageKind::Unknown,
    };

    match root.as_str() {
        "request-hello" => MessageKind::RequestHello,
        "hello" => MessageKind::PeerHello,
        "rpc" => match first_element(&mut reader).as_deref() {
            Some("get-config") => MessageKind::GetConfig,
            Some("edit-config") => MessageKind::EditConfig,
            Some("close-session") => MessageKind::CloseSession,
            Some("kill-session") => MessageKind::KillSession,
            _ => MessageKind::Unknown,
        },
        _ => MessageKind::Unknown,
    }
}

/// Extract the `message-id` attribute of the `<rpc>` element, if any.
pub fn message_id_of(raw: &str) -> Option<String> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"rpc" {
                    return attr(&e, "message-id").ok().flatten();
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Parse a `<get-config>` request, extracting the message id and filter.
pub fn parse_get_config(raw: &str) -> Result<GetConfigRequest, ParseError> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut message_id = String::new();
    let mut filter: Option<Filter> = None;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"rpc" => {
                    message_id = attr(&e, "message-id")?.unwrap_or_default();
                }
                b"filter" => {
                    filter = Some(Filter {
                        filter_type: attr(&e, "type")?.unwrap_or_default(),
                        xmlns: attr(&e, "xmlns")?.unwrap_or_default(),
                        select: attr(&e, "select")?.unwrap_or_default(),
                    });
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(GetConfigRequest {
        message_id,
        filter: filter.ok_or(ParseError::MissingElement("filter"))?,
    })
}

/// Parse an `<edit-config>` request, capturing the raw `<config>` body.
pub fn parse_edit_config(raw: &str) -> Result<EditConfigRequest, ParseError> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut message_id = String::new();
    let mut default_operation: Option<String> = None;
    let mut config: Option<String> = None;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"rpc" => {
                    message_id = attr(&e, "message-id")?.unwrap_or_default();
                }
                b"default-operation" => {
                    default_operation =
                        Some(reader.read_text(e.name()).map_err(xml_err)?.into_owned());
                }
                b"config" => {
                    config = Some(reader.read_text(e.name()).map_err(xml_err)?.into_owned());
                }
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"rpc" {
                    message_id = attr(&e, "message-id")?.unwrap_or_default();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(EditConfigRequest {
        message_id,
        default_operation,
        config: config.ok_or(ParseError::MissingElement("config"))?,
    })
}

/// Build the server `<hello>` advertising the given capabilities, in order.
pub fn hello(capabilities: &[String]) -> String {
    let caps: String = capabilities
        .iter()
        .map(|c| format!("<capability>{}</capability>", escape(c.as_str())))
        .collect();
    format!("<hello xmlns=\"{BASE_NS}\"><capabilities>{caps}</capabilities></hello>")
}

/// Build an `<rpc-reply>` carrying JSON payload bytes as escaped character
/// data inside `<data>`.
pub fn rpc_reply_data(message_id: &str, json: &str) -> String {
    format!(
        "<rpc-reply xmlns=\"{BASE_NS}\" message-id=\"{}\"><data>{}</data></rpc-reply>",
        escape(message_id),
        escape(json)
    )
}

/// Build an `<rpc-reply>` acknowledging a successful `<edit-config>`.
pub fn rpc_reply_ok(message_id: &str) -> String {
    format!(
        "<rpc-reply xmlns=\"{BASE_NS}\" message-id=\"{}\"><ok/></rpc-reply>",
        escape(message_id)
    )
}

/// Build an `<rpc-reply>` carrying one or more `<rpc-error>` entries.
pub fn rpc_reply_errors(message_id: &str, errors: &[RpcError]) -> String {
    let body: String = errors
        .iter()
        .map(|e| {
            format!(
                "<rpc-error><error-type>{}</error-type><error-message>{}</error-message></rpc-error>",
                escape(&e.error_type),
                escape(&e.message)
            )
        })
        .collect();
    format!(
        "<rpc-reply xmlns=\"{BASE_NS}\" message-id=\"{}\">{}</rpc-reply>",
        escape(message_id),
        body
    )
}

/// Build the `<close-session>` acknowledgement reply.
pub fn rpc_reply_close(message_id: &str) -> String {
    format!(
        "<rpc-reply xmlns=\"{BASE_NS}\" message-id=\"{}\"><close-session/></rpc-reply>",
        escape(message_id)
    )
}

/// Build the `<kill-session>` acknowledgement carrying the target session id.
pub fn kill_session(message_id: &str, session_id: &str) -> String {
    format!(
        "<kill-session xmlns=\"{BASE_NS}\" message-id=\"{}\"><session-id>{}</session-id></kill-session>",
        escape(message_id),
        escape(session_id)
    )
}
