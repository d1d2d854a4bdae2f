//! Response decoding.
//!
//! Responses are read with a streaming pull parser. Every `<return>` element
//! in the SOAP body becomes a flat list of its leaf fields, and the typed
//! records are built from those lists. Namespace prefixes are ignored because
//! the API is inconsistent about them.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use super::error::{ApiError, Operation};
use super::model::{Acknowledged, DataCenter, ServerCreated, ServerStatus, StorageCreated};
use super::types::{DataCenterId, ServerId, StorageId, VirtualMachineState};

/// Leaf fields of one `<return>` element, in document order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReturnFields {
    fields: Vec<(String, String)>,
}

impl ReturnFields {
    /// Returns the first value recorded for `name`.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns every value recorded for `name`.
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn push(&mut self, name: String, value: String) {
        self.fields.push((name, value));
    }
}

/// A successfully parsed, fault-free SOAP response.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SoapResponse {
    /// `<return>` elements of the body, in document order.
    pub returns: Vec<ReturnFields>,
}

/// Record that can be built from a [`SoapResponse`].
pub trait ResponseRecord: Sized {
    /// Builds the record, checking mandatory fields.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::EmptyResult`] when a mandatory field is absent and
    /// [`ApiError::Decode`] when a field cannot be interpreted.
    fn from_response(
        operation: Operation,
        response: SoapResponse,
        body: &str,
    ) -> Result<Self, ApiError>;
}

/// Parses `body` and builds the record type `T` from it.
///
/// # Errors
///
/// Returns [`ApiError::Decode`] for malformed documents, [`ApiError::Fault`]
/// when the body carries a SOAP fault, and whatever `T` reports for missing
/// fields.
pub fn decode<T: ResponseRecord>(operation: Operation, body: &str) -> Result<T, ApiError> {
    let response = parse_envelope(operation, body)?;
    T::from_response(operation, response, body)
}

/// Parses the SOAP envelope without interpreting the returned fields.
///
/// # Errors
///
/// Returns [`ApiError::Decode`] for malformed XML or a missing envelope or
/// body, and [`ApiError::Fault`] when the body carries a SOAP fault.
pub fn parse_envelope(operation: Operation, body: &str) -> Result<SoapResponse, ApiError> {
    let mut parser = EnvelopeParser::default();
    let mut reader = Reader::from_str(body);
    loop {
        let event = reader
            .read_event()
            .map_err(|err| malformed(operation, body, err.to_string()))?;
        match event {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                parser.open(name);
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                parser.open(name);
                parser
                    .close()
                    .map_err(|message| malformed(operation, body, message))?;
            }
            Event::End(_) => parser
                .close()
                .map_err(|message| malformed(operation, body, message))?,
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|err| malformed(operation, body, err.to_string()))?;
                parser.text(&value);
            }
            Event::CData(data) => parser.text(&String::from_utf8_lossy(&data)),
            Event::Eof => break,
            _ => {}
        }
    }
    parser.finish(operation, body)
}

#[derive(Debug)]
struct Frame {
    name: String,
    text: String,
    has_children: bool,
}

#[derive(Debug, Default)]
struct EnvelopeParser {
    stack: Vec<Frame>,
    saw_envelope: bool,
    saw_body: bool,
    return_depth: Option<usize>,
    current: ReturnFields,
    returns: Vec<ReturnFields>,
    fault_depth: Option<usize>,
    fault_code: Option<String>,
    fault_message: Option<String>,
}

impl EnvelopeParser {
    fn open(&mut self, name: String) {
        let depth = self.stack.len();
        if let Some(parent) = self.stack.last_mut() {
            parent.has_children = true;
        }
        match (depth, name.as_str()) {
            (0, "Envelope") => self.saw_envelope = true,
            (1, "Body") if self.saw_envelope => self.saw_body = true,
            _ => {}
        }
        if self.saw_body && self.return_depth.is_none() && name == "return" {
            self.return_depth = Some(depth);
            self.current = ReturnFields::default();
        }
        if self.saw_body && self.fault_depth.is_none() && name == "Fault" {
            self.fault_depth = Some(depth);
        }
        self.stack.push(Frame {
            name,
            text: String::new(),
            has_children: false,
        });
    }

    fn text(&mut self, value: &str) {
        if let Some(frame) = self.stack.last_mut() {
            frame.text.push_str(value);
        }
    }

    fn close(&mut self) -> Result<(), String> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| "closing tag without a matching opening tag".to_owned())?;
        let depth = self.stack.len();

        if self.return_depth == Some(depth) {
            self.return_depth = None;
            self.returns.push(std::mem::take(&mut self.current));
            return Ok(());
        }
        if self.fault_depth == Some(depth) {
            self.fault_depth = None;
            return Ok(());
        }
        if frame.has_children {
            return Ok(());
        }

        let value = frame.text.trim().to_owned();
        if self.return_depth.is_some() {
            self.current.push(frame.name, value);
        } else if self.fault_depth.is_some() {
            match frame.name.as_str() {
                "faultcode" => self.fault_code = Some(value),
                "faultstring" => self.fault_message = Some(value),
                _ => {}
            }
        }
        Ok(())
    }

    fn finish(self, operation: Operation, body: &str) -> Result<SoapResponse, ApiError> {
        if let Some(open) = self.stack.last() {
            return Err(malformed(
                operation,
                body,
                format!("document ended inside <{}>", open.name),
            ));
        }
        if !self.saw_envelope {
            return Err(malformed(operation, body, "missing SOAP envelope".to_owned()));
        }
        if !self.saw_body {
            return Err(malformed(operation, body, "missing SOAP body".to_owned()));
        }
        if self.fault_code.is_some() || self.fault_message.is_some() {
            return Err(ApiError::Fault {
                operation,
                code: self.fault_code.unwrap_or_default(),
                message: self.fault_message.unwrap_or_default(),
                body: body.to_owned(),
            });
        }
        Ok(SoapResponse {
            returns: self.returns,
        })
    }
}

fn malformed(operation: Operation, body: &str, message: String) -> ApiError {
    ApiError::Decode {
        operation,
        message,
        body: body.to_owned(),
    }
}

fn required(
    operation: Operation,
    fields: &ReturnFields,
    field: &'static str,
    body: &str,
) -> Result<String, ApiError> {
    fields
        .first(field)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::EmptyResult {
            operation,
            field,
            body: body.to_owned(),
        })
}

fn single_return(
    operation: Operation,
    response: SoapResponse,
    body: &str,
) -> Result<ReturnFields, ApiError> {
    response
        .returns
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::EmptyResult {
            operation,
            field: "return",
            body: body.to_owned(),
        })
}

fn optional(fields: &ReturnFields, name: &str) -> Option<String> {
    fields
        .first(name)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

impl ResponseRecord for Vec<DataCenter> {
    fn from_response(
        operation: Operation,
        response: SoapResponse,
        body: &str,
    ) -> Result<Self, ApiError> {
        response
            .returns
            .iter()
            .map(|fields| {
                let id = required(operation, fields, "dataCenterId", body)?;
                let version = match fields.first("dataCenterVersion") {
                    None | Some("") => 0,
                    Some(raw) => raw.parse().map_err(|_| {
                        malformed(
                            operation,
                            body,
                            format!("invalid dataCenterVersion '{raw}'"),
                        )
                    })?,
                };
                Ok(DataCenter {
                    id: DataCenterId::new(id),
                    name: fields.first("dataCenterName").unwrap_or_default().to_owned(),
                    version,
                    provisioning_state: fields
                        .first("provisioningState")
                        .unwrap_or_default()
                        .to_owned(),
                })
            })
            .collect()
    }
}

impl ResponseRecord for StorageCreated {
    fn from_response(
        operation: Operation,
        response: SoapResponse,
        body: &str,
    ) -> Result<Self, ApiError> {
        let fields = single_return(operation, response, body)?;
        Ok(Self {
            storage_id: StorageId::new(required(operation, &fields, "storageId", body)?),
            request_id: optional(&fields, "requestId"),
        })
    }
}

impl ResponseRecord for ServerCreated {
    fn from_response(
        operation: Operation,
        response: SoapResponse,
        body: &str,
    ) -> Result<Self, ApiError> {
        let fields = single_return(operation, response, body)?;
        Ok(Self {
            server_id: ServerId::new(required(operation, &fields, "serverId", body)?),
            request_id: optional(&fields, "requestId"),
        })
    }
}

impl ResponseRecord for ServerStatus {
    fn from_response(
        operation: Operation,
        response: SoapResponse,
        body: &str,
    ) -> Result<Self, ApiError> {
        let fields = single_return(operation, response, body)?;
        Ok(Self {
            server_id: ServerId::new(required(operation, &fields, "serverId", body)?),
            server_name: fields.first("serverName").unwrap_or_default().to_owned(),
            state: VirtualMachineState::parse(
                fields.first("virtualMachineState").unwrap_or_default(),
            ),
            provisioning_state: fields
                .first("provisioningState")
                .unwrap_or_default()
                .to_owned(),
            ips: fields
                .all("ips")
                .filter(|ip| !ip.is_empty())
                .map(str::to_owned)
                .collect(),
        })
    }
}

impl ResponseRecord for Acknowledged {
    fn from_response(
        _operation: Operation,
        response: SoapResponse,
        _body: &str,
    ) -> Result<Self, ApiError> {
        let request_id = response
            .returns
            .first()
            .and_then(|fields| optional(fields, "requestId"));
        Ok(Self { request_id })
    }
}
