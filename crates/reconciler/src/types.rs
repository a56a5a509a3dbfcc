//! Custom resource types and the naming/encoding rules shared by the handlers.

use std::io;

use kube::{CustomResource, ResourceExt};
use schemars::gen::SchemaGenerator;
use schemars::schema::{Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;

use crate::error::{Error, Result};

/// API group of both custom resources.
pub const API_GROUP: &str = "datalab.tuwien.ac.at";

/// Suffix of the backing store name derived from a ConfigServer name.
pub const VALUES_SUFFIX: &str = "-values";

/// Longest key a ConfigMap accepts.
const MAX_KEY_LEN: usize = 253;

/// Desired state of a config-serving endpoint.
#[derive(CustomResource, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "datalab.tuwien.ac.at",
    version = "v1",
    kind = "ConfigServer",
    plural = "configservers",
    shortname = "cs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigServerSpec {
    /// Container image serving the values.
    pub image: String,

    /// Image pull policy of the serving container.
    #[serde(default = "default_pull_policy")]
    pub image_pull_policy: String,

    /// Port the serving container listens on.
    pub container_port: i32,

    /// Directory the backing store is mounted at.
    #[serde(default = "default_mount_path")]
    pub config_mount_path: String,
}

fn default_pull_policy() -> String {
    "IfNotPresent".to_string()
}

fn default_mount_path() -> String {
    "/var/lib/config-server".to_string()
}

impl ConfigServerSpec {
    /// Check the structural constraints the derived objects rely on.
    ///
    /// # Errors
    ///
    /// Returns a permanent error for an out-of-range port or an empty mount path.
    pub fn validate(&self) -> Result<()> {
        if !(1..=65535).contains(&self.container_port) {
            return Err(Error::permanent(format!(
                "containerPort must be within 1..=65535, got {}",
                self.container_port
            )));
        }
        if self.config_mount_path.trim().is_empty() {
            return Err(Error::permanent("configMountPath must not be empty"));
        }
        if self.image.trim().is_empty() {
            return Err(Error::permanent("image must not be empty"));
        }
        Ok(())
    }
}

/// One entry to materialize into a ConfigServer's backing store.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "datalab.tuwien.ac.at",
    version = "v1",
    kind = "KeyValuePair",
    plural = "keyvaluepairs",
    shortname = "kvp",
    namespaced
)]
pub struct KeyValuePairSpec {
    /// Name of the target ConfigServer.
    pub config: String,

    /// Key inside the backing store.
    pub key: String,

    /// Arbitrary structured value.
    #[schemars(schema_with = "any_value")]
    pub value: serde_json::Value,
}

fn any_value(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject::default();
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

impl KeyValuePairSpec {
    /// Check that the key can live in a ConfigMap and as a mounted file name.
    ///
    /// # Errors
    ///
    /// Returns a permanent error for an empty, oversized or malformed key.
    pub fn validate(&self) -> Result<()> {
        if self.config.is_empty() {
            return Err(Error::permanent("config must name a ConfigServer"));
        }
        if self.key.is_empty() {
            return Err(Error::permanent("key must not be empty"));
        }
        if self.key.len() > MAX_KEY_LEN {
            return Err(Error::permanent(format!(
                "key '{}' exceeds {MAX_KEY_LEN} characters",
                self.key
            )));
        }
        let valid = self
            .key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid || self.key == "." || self.key == ".." {
            return Err(Error::permanent(format!(
                "key '{}' may only contain alphanumerics, '-', '_' and '.'",
                self.key
            )));
        }
        Ok(())
    }

    /// Name of the backing store this entry materializes into.
    pub fn values_name(&self) -> String {
        values_name(&self.config)
    }

    /// JSON-encoded representation stored in the backing store.
    ///
    /// # Errors
    ///
    /// Returns a data format error if the value cannot be serialized.
    pub fn encoded_value(&self) -> Result<String> {
        encode_value(&self.value)
    }
}

/// Name of the backing store owned by a ConfigServer.
pub fn values_name(server: &str) -> String {
    format!("{server}{VALUES_SUFFIX}")
}

/// Encode a value the way the backing store holds it.
///
/// The layout is the conventional spaced one: `{"a": 1, "b": [1, 2]}`, with
/// non-ASCII characters escaped as `\uXXXX`.
///
/// # Errors
///
/// Returns a data format error if the value cannot be serialized.
pub fn encode_value(value: &serde_json::Value) -> Result<String> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|err| Error::data_format(err.to_string()))
}

/// Single-line formatter separating items with `", "` and keys with `": "`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for c in fragment.chars() {
            if c.is_ascii() {
                let mut utf8 = [0_u8; 4];
                writer.write_all(c.encode_utf8(&mut utf8).as_bytes())?;
            } else {
                let mut units = [0_u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Decode a value read back from the backing store.
///
/// # Errors
///
/// Returns a data format error if the stored string is not valid JSON.
pub fn decode_value(raw: &str) -> Result<serde_json::Value> {
    Ok(serde_json::from_str(raw)?)
}

/// Identity of a namespaced resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace of the resource.
    pub namespace: String,
    /// Name of the resource.
    pub name: String,
}

impl ObjectKey {
    /// Create a new key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a stored resource.
    pub fn of<K: ResourceExt>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Resource whose desired state is carried by a comparable spec.
pub trait Declared: kube::Resource<DynamicType = ()> + Clone + Send + Sync + 'static {
    /// Desired-state part of the resource.
    type Spec: PartialEq;

    /// Borrow the desired state.
    fn declared(&self) -> &Self::Spec;
}

impl Declared for ConfigServer {
    type Spec = ConfigServerSpec;

    fn declared(&self) -> &Self::Spec {
        &self.spec
    }
}

impl Declared for KeyValuePair {
    type Spec = KeyValuePairSpec;

    fn declared(&self) -> &Self::Spec {
        &self.spec
    }
}
