//! SOAP envelope construction and parsing.
//!
//! The document wire convention: a request payload travels inside
//! `<lowerCamel(OperationName)Request>`, a reply inside
//! `<lowerCamel(OperationName)Response>`, and a fault replaces the wrapper
//! entirely. Outbound requests additionally carry WS-Addressing headers and
//! the charge point identity.

use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::SoapError;
use crate::ocpp::Action;
use crate::service::Fault;

pub const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const RPC_NS: &str = "http://www.w3.org/2003/05/soap-rpc";
pub const WSA_NS: &str = "http://www.w3.org/2005/08/addressing";
pub const WSA_ANONYMOUS: &str = "http://www.w3.org/2005/08/addressing/anonymous";

/// Operation namespace of the central system service (outbound calls).
pub const CENTRAL_SYSTEM_NS: &str = "urn://Ocpp/Cs/2012/06/";
/// Operation namespace of the charge point service (inbound calls).
pub const CHARGE_POINT_NS: &str = "urn://Ocpp/Cp/2012/06/";

pub const CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Correlation and routing metadata attached to every outbound request.
#[derive(Debug, Clone)]
pub struct AddressingHeaders {
    pub message_id: String,
    pub from: String,
    pub reply_to: String,
    pub to: String,
    pub action: String,
    pub charge_box_identity: String,
}

impl AddressingHeaders {
    /// Fresh headers for one call: new message id, anonymous reply-to,
    /// action derived from the operation name.
    pub fn fresh(action: Action, identity: &str, local_url: &str, endpoint: &str) -> Self {
        Self {
            message_id: format!("urn:uuid:{}", Uuid::new_v4()),
            from: local_url.to_string(),
            reply_to: WSA_ANONYMOUS.to_string(),
            to: endpoint.to_string(),
            action: format!("/{action}"),
            charge_box_identity: identity.to_string(),
        }
    }
}

pub fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

pub fn request_element(action: Action) -> String {
    format!("{}Request", lower_camel(action.as_str()))
}

pub fn response_element(action: Action) -> String {
    format!("{}Response", lower_camel(action.as_str()))
}

/// Outbound request envelope with addressing headers.
pub fn request_envelope(
    action: Action,
    headers: &AddressingHeaders,
    payload: &Value,
    service_ns: &str,
) -> String {
    let mut xml = String::with_capacity(1024);
    xml.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str(&format!(
        r#"<soap:Envelope xmlns:soap="{SOAP_NS}" xmlns:wsa="{WSA_NS}">"#
    ));
    xml.push_str("<soap:Header>");
    xml.push_str(&format!(
        r#"<chargeBoxIdentity xmlns="{}">{}</chargeBoxIdentity>"#,
        service_ns,
        escape(&headers.charge_box_identity)
    ));
    xml.push_str(&format!(
        "<wsa:MessageID>{}</wsa:MessageID>",
        escape(&headers.message_id)
    ));
    xml.push_str(&format!(
        "<wsa:From><wsa:Address>{}</wsa:Address></wsa:From>",
        escape(&headers.from)
    ));
    xml.push_str(&format!(
        "<wsa:ReplyTo><wsa:Address>{}</wsa:Address></wsa:ReplyTo>",
        escape(&headers.reply_to)
    ));
    xml.push_str(&format!("<wsa:To>{}</wsa:To>", escape(&headers.to)));
    xml.push_str(&format!(
        r#"<wsa:Action soap:mustUnderstand="1">{}</wsa:Action>"#,
        escape(&headers.action)
    ));
    xml.push_str("</soap:Header>");
    xml.push_str("<soap:Body>");
    write_wrapped(&request_element(action), payload, service_ns, &mut xml);
    xml.push_str("</soap:Body></soap:Envelope>");
    xml
}

/// Reply envelope for an inbound call.
pub fn response_envelope(action: Action, payload: &Value, service_ns: &str) -> String {
    let mut xml = String::with_capacity(512);
    xml.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str(&format!(r#"<soap:Envelope xmlns:soap="{SOAP_NS}">"#));
    xml.push_str("<soap:Body>");
    write_wrapped(&response_element(action), payload, service_ns, &mut xml);
    xml.push_str("</soap:Body></soap:Envelope>");
    xml
}

/// Fault envelope; bypasses the operation wrapping entirely.
pub fn fault_envelope(fault: &Fault) -> String {
    let mut xml = String::with_capacity(512);
    xml.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str(&format!(
        r#"<soap:Envelope xmlns:soap="{SOAP_NS}" xmlns:rpc="{RPC_NS}">"#
    ));
    xml.push_str("<soap:Body><soap:Fault>");
    xml.push_str(&format!(
        "<soap:Code><soap:Value>{}</soap:Value><soap:Subcode><soap:Value>{}</soap:Value></soap:Subcode></soap:Code>",
        escape(&fault.code),
        escape(&fault.subcode)
    ));
    xml.push_str(&format!(
        r#"<soap:Reason><soap:Text xml:lang="en">{}</soap:Text></soap:Reason>"#,
        escape(&fault.reason)
    ));
    xml.push_str("</soap:Fault></soap:Body></soap:Envelope>");
    xml
}

/// An inbound request, unwrapped.
#[derive(Debug)]
pub struct InboundRequest {
    pub action: Action,
    pub payload: Value,
    pub charge_box_identity: Option<String>,
    pub message_id: Option<String>,
}

pub fn parse_request_envelope(xml: &str) -> Result<InboundRequest, SoapError> {
    let document = roxmltree::Document::parse(xml)?;
    let root = document.root_element();

    let body = root
        .children()
        .find(|node| node.is_element() && node.tag_name().name() == "Body")
        .ok_or_else(|| SoapError::Malformed("no Body element".into()))?;

    let wrapper = body
        .children()
        .find(|node| node.is_element())
        .ok_or_else(|| SoapError::Malformed("empty Body".into()))?;

    let element = wrapper.tag_name().name();
    let operation = element
        .strip_suffix("Request")
        .filter(|name| !name.is_empty())
        .ok_or_else(|| SoapError::UnknownOperation(element.to_string()))?;

    let mut pascal = operation.to_string();
    if let Some(first) = pascal.get_mut(..1) {
        first.make_ascii_uppercase();
    }
    let action: Action = pascal
        .parse()
        .map_err(|_| SoapError::UnknownOperation(element.to_string()))?;

    let header_text = |name: &str| {
        root.descendants()
            .find(|node| node.is_element() && node.tag_name().name() == name)
            .and_then(|node| node.text())
            .map(|text| text.trim().to_string())
    };

    Ok(InboundRequest {
        action,
        payload: element_to_value(wrapper),
        charge_box_identity: header_text("chargeBoxIdentity"),
        message_id: header_text("MessageID"),
    })
}

/// Parse a reply envelope into the unwrapped payload, or the fault it
/// carried instead.
pub fn parse_reply_envelope(xml: &str) -> Result<Value, SoapError> {
    let document = roxmltree::Document::parse(xml)?;
    let root = document.root_element();

    let body = root
        .children()
        .find(|node| node.is_element() && node.tag_name().name() == "Body")
        .ok_or_else(|| SoapError::Malformed("no Body element".into()))?;

    if let Some(fault) = body
        .children()
        .find(|node| node.is_element() && node.tag_name().name() == "Fault")
    {
        return Err(SoapError::Fault(parse_fault(fault)));
    }

    let wrapper = body
        .children()
        .find(|node| node.is_element())
        .ok_or_else(|| SoapError::Malformed("empty Body".into()))?;

    Ok(match element_to_value(wrapper) {
        Value::Null => json!({}),
        payload => payload,
    })
}

fn parse_fault(fault: roxmltree::Node<'_, '_>) -> Fault {
    let find_text = |names: &[&str]| -> Option<String> {
        let mut node = fault;
        for name in names {
            node = node
                .children()
                .find(|child| child.is_element() && child.tag_name().name() == *name)?;
        }
        node.text().map(|text| text.trim().to_string())
    };

    Fault::new(
        find_text(&["Code", "Value"]).unwrap_or_default(),
        find_text(&["Code", "Subcode", "Value"]).unwrap_or_default(),
        find_text(&["Reason", "Text"]).unwrap_or_default(),
    )
}

fn write_wrapped(element: &str, payload: &Value, service_ns: &str, out: &mut String) {
    match payload {
        Value::Null => out.push_str(&format!(r#"<{element} xmlns="{service_ns}"/>"#)),
        Value::Object(fields) if fields.is_empty() => {
            out.push_str(&format!(r#"<{element} xmlns="{service_ns}"/>"#))
        }
        Value::Object(fields) => {
            out.push_str(&format!(r#"<{element} xmlns="{service_ns}">"#));
            for (name, value) in fields {
                write_field(name, value, out);
            }
            out.push_str(&format!("</{element}>"));
        }
        scalar => {
            out.push_str(&format!(r#"<{element} xmlns="{service_ns}">"#));
            write_text(scalar, out);
            out.push_str(&format!("</{element}>"));
        }
    }
}

fn write_field(name: &str, value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str(&format!("<{name}/>")),
        Value::Array(items) => {
            for item in items {
                write_field(name, item, out);
            }
        }
        Value::Object(fields) => {
            out.push_str(&format!("<{name}>"));
            for (child, value) in fields {
                write_field(child, value, out);
            }
            out.push_str(&format!("</{name}>"));
        }
        scalar => {
            out.push_str(&format!("<{name}>"));
            write_text(scalar, out);
            out.push_str(&format!("</{name}>"));
        }
    }
}

fn write_text(value: &Value, out: &mut String) {
    match value {
        Value::String(text) => out.push_str(&escape(text)),
        other => out.push_str(&escape(&other.to_string())),
    }
}

/// Lenient element-to-JSON conversion: repeated sibling names become
/// arrays, leaf text becomes a bool/integer when it reads as one and a
/// string otherwise. The document wire carries no type information.
fn element_to_value(node: roxmltree::Node<'_, '_>) -> Value {
    let children: Vec<_> = node.children().filter(|child| child.is_element()).collect();

    if children.is_empty() {
        return match node.text().map(str::trim).filter(|text| !text.is_empty()) {
            Some(text) => scalar_from_text(text),
            None => Value::Null,
        };
    }

    let mut fields = Map::new();
    for child in children {
        let name = child.tag_name().name().to_string();
        let value = element_to_value(child);
        match fields.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                fields.insert(name, value);
            }
        }
    }
    Value::Object(fields)
}

fn scalar_from_text(text: &str) -> Value {
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match text.parse::<i64>() {
            // Round-trip guard: "007" and "+5" stay strings.
            Ok(int) if int.to_string() == text => Value::Number(int.into()),
            _ => Value::String(text.to_string()),
        },
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_carries_addressing_headers() {
        let headers = AddressingHeaders::fresh(
            Action::StartTransaction,
            "test",
            "http://localhost:12801/",
            "http://cs.example/ocpp",
        );
        let xml = request_envelope(
            Action::StartTransaction,
            &headers,
            &json!({"connectorId": 1, "idTag": "123456"}),
            CENTRAL_SYSTEM_NS,
        );

        assert!(xml.contains("<wsa:Action soap:mustUnderstand=\"1\">/StartTransaction</wsa:Action>"));
        assert!(xml.contains("<chargeBoxIdentity xmlns=\"urn://Ocpp/Cs/2012/06/\">test</chargeBoxIdentity>"));
        assert!(xml.contains("<wsa:ReplyTo><wsa:Address>http://www.w3.org/2005/08/addressing/anonymous</wsa:Address></wsa:ReplyTo>"));
        assert!(xml.contains("<wsa:To>http://cs.example/ocpp</wsa:To>"));
        assert!(xml.contains("<wsa:MessageID>urn:uuid:"));
        assert!(xml.contains("<startTransactionRequest xmlns=\"urn://Ocpp/Cs/2012/06/\">"));
        assert!(xml.contains("<connectorId>1</connectorId>"));
        assert!(xml.contains("<idTag>123456</idTag>"));
    }

    #[test]
    fn fresh_headers_differ_per_call() {
        let first = AddressingHeaders::fresh(Action::Heartbeat, "t", "from", "to");
        let second = AddressingHeaders::fresh(Action::Heartbeat, "t", "from", "to");
        assert_ne!(first.message_id, second.message_id);
    }

    #[test]
    fn parses_inbound_request() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
              <soap:Header>
                <chargeBoxIdentity xmlns="urn://Ocpp/Cp/2012/06/">test</chargeBoxIdentity>
              </soap:Header>
              <soap:Body>
                <remoteStartTransactionRequest xmlns="urn://Ocpp/Cp/2012/06/">
                  <connectorId>1</connectorId>
                  <idTag>123456</idTag>
                </remoteStartTransactionRequest>
              </soap:Body>
            </soap:Envelope>"#;

        let request = parse_request_envelope(xml).unwrap();
        assert_eq!(request.action, Action::RemoteStartTransaction);
        assert_eq!(request.charge_box_identity.as_deref(), Some("test"));
        assert_eq!(request.payload["connectorId"], 1);
        // Lenient typing turns the digits into a number; the typed request
        // struct accepts either.
        assert_eq!(request.payload["idTag"], 123456);
    }

    #[test]
    fn rejects_unknown_operation() {
        let xml = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
              <soap:Body><diagnosticsStatusNotificationRequest/></soap:Body>
            </soap:Envelope>"#;
        assert!(matches!(
            parse_request_envelope(xml),
            Err(SoapError::UnknownOperation(_))
        ));
    }

    #[test]
    fn response_wrapping_uses_lower_camel() {
        let xml = response_envelope(
            Action::GetConfiguration,
            &json!({"configurationKey": [
                {"key": "ResetRetries", "readonly": false, "value": "1"},
                {"key": "MeterValueSampleInterval", "readonly": false, "value": "20"}
            ]}),
            CHARGE_POINT_NS,
        );
        assert!(xml.contains("<getConfigurationResponse xmlns=\"urn://Ocpp/Cp/2012/06/\">"));
        assert!(xml.contains("<configurationKey><key>ResetRetries</key>"));

        let payload = parse_reply_envelope(&xml).unwrap();
        assert_eq!(payload["configurationKey"][1]["key"], "MeterValueSampleInterval");
        assert_eq!(payload["configurationKey"][0]["readonly"], false);
    }

    #[test]
    fn single_element_sequences_need_type_hints_downstream() {
        // One configurationKey entry parses as an object, not a one-element
        // array; callers treating the reply as raw JSON see that shape.
        let xml = response_envelope(
            Action::GetConfiguration,
            &json!({"configurationKey": [
                {"key": "ResetRetries", "readonly": false, "value": "1"}
            ]}),
            CHARGE_POINT_NS,
        );
        let payload = parse_reply_envelope(&xml).unwrap();
        assert_eq!(payload["configurationKey"]["key"], "ResetRetries");
    }

    #[test]
    fn fault_envelope_round_trips() {
        let xml = fault_envelope(&Fault::processing_error());
        assert!(xml.contains("<soap:Value>soap:Sender</soap:Value>"));
        assert!(xml.contains("<soap:Subcode><soap:Value>rpc:BadArguments</soap:Value></soap:Subcode>"));
        assert!(xml.contains(r#"<soap:Text xml:lang="en">Processing Error</soap:Text>"#));

        match parse_reply_envelope(&xml) {
            Err(SoapError::Fault(fault)) => {
                assert_eq!(fault, Fault::processing_error());
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn empty_payload_becomes_self_closing_wrapper() {
        let headers = AddressingHeaders::fresh(Action::Heartbeat, "t", "from", "to");
        let xml = request_envelope(Action::Heartbeat, &headers, &json!({}), CENTRAL_SYSTEM_NS);
        assert!(xml.contains(r#"<heartbeatRequest xmlns="urn://Ocpp/Cs/2012/06/"/>"#));
    }

    #[test]
    fn escapes_markup_in_text() {
        let xml = response_envelope(
            Action::ChangeConfiguration,
            &json!({"status": "<Accepted & \"quoted\">"}),
            CHARGE_POINT_NS,
        );
        assert!(xml.contains("&lt;Accepted &amp; &quot;quoted&quot;&gt;"));
    }
}
