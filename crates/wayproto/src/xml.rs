//! Loader for the XML protocol description format.
//!
//! ```xml
//! <protocol name="example">
//!   <interface name="ex_thing" version="2">
//!     <request name="destroy" type="destructor"/>
//!     <request name="set_title" since="2">
//!       <arg name="title" type="string" allow-null="true"/>
//!     </request>
//!     <event name="configure">
//!       <arg name="width" type="int"/>
//!     </event>
//!   </interface>
//! </protocol>
//! ```
//!
//! Descriptions, enums and copyright blocks are skipped. Requests and events
//! keep document order, which fixes their opcodes.

use serde::Deserialize;
use waypack::ArgKind;
use waypack::ArgSpec;

use crate::error::Error;
use crate::error::Result;
use crate::interface::InterfaceDef;
use crate::interface::MethodDef;

/// A parsed `<protocol>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    pub name: String,
    pub interfaces: Vec<InterfaceDef>,
}

#[derive(Debug, Deserialize)]
struct ProtocolXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "interface", default)]
    interfaces: Vec<InterfaceXml>,
}

#[derive(Debug, Deserialize)]
struct InterfaceXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@version")]
    version: u32,
    #[serde(rename = "request", default)]
    requests: Vec<MethodXml>,
    #[serde(rename = "event", default)]
    events: Vec<MethodXml>,
}

#[derive(Debug, Deserialize)]
struct MethodXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@type", default)]
    kind: Option<String>,
    #[serde(rename = "@since", default)]
    since: Option<u32>,
    #[serde(rename = "arg", default)]
    args: Vec<ArgXml>,
}

#[derive(Debug, Deserialize)]
struct ArgXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@interface", default)]
    interface: Option<String>,
    #[serde(rename = "@allow-null", default)]
    allow_null: Option<String>,
}

/// Parses one protocol description.
pub fn parse_protocol(source: &str) -> Result<Protocol> {
    let raw: ProtocolXml = quick_xml::de::from_str(source).map_err(|e| Error::Xml(e.to_string()))?;
    let interfaces = raw
        .interfaces
        .into_iter()
        .map(InterfaceXml::into_def)
        .collect::<Result<Vec<_>>>()?;
    Ok(Protocol { name: raw.name, interfaces })
}

impl InterfaceXml {
    fn into_def(self) -> Result<InterfaceDef> {
        let name = self.name;
        let convert = |methods: Vec<MethodXml>| -> Result<Vec<MethodDef>> {
            methods.into_iter().map(|m| m.into_def(&name)).collect()
        };
        let requests = convert(self.requests)?;
        let events = convert(self.events)?;
        Ok(InterfaceDef { name, version: self.version, requests, events })
    }
}

impl MethodXml {
    fn into_def(self, interface: &str) -> Result<MethodDef> {
        let destructor = match self.kind.as_deref() {
            None => false,
            Some("destructor") => true,
            Some(other) => {
                return Err(Error::Xml(format!(
                    "{interface}.{}: unknown method type {other:?}",
                    self.name
                )));
            }
        };
        let args = self
            .args
            .into_iter()
            .map(|a| a.into_spec(interface, &self.name))
            .collect::<Result<Vec<_>>>()?;

        let mut def = MethodDef::new(self.name, args).since(self.since.unwrap_or(1));
        def.destructor = destructor;
        Ok(def)
    }
}

impl ArgXml {
    fn into_spec(self, interface: &str, method: &str) -> Result<ArgSpec> {
        let kind = match self.kind.as_str() {
            "int" => ArgKind::Int,
            "uint" => ArgKind::Uint,
            "fixed" => ArgKind::Fixed,
            "string" => ArgKind::String,
            "object" => ArgKind::Object,
            "new_id" => ArgKind::NewId,
            "array" => ArgKind::Array,
            "fd" => ArgKind::Fd,
            other => {
                return Err(Error::Xml(format!(
                    "{interface}.{method}.{}: unknown argument type {other:?}",
                    self.name
                )));
            }
        };
        let nullable = match self.allow_null.as_deref() {
            None | Some("false") => false,
            Some("true") => true,
            Some(other) => {
                return Err(Error::Xml(format!(
                    "{interface}.{method}.{}: allow-null must be true or false, got {other:?}",
                    self.name
                )));
            }
        };
        Ok(ArgSpec { name: self.name, kind, interface: self.interface, nullable })
    }
}
