// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Describes the buckets the VM API needs in its storage backend.
//!
//! A [Schema] maps a logical bucket key (e.g. `vms`) to a [BucketSpec]: the
//! bucket name in the backend, its indexed fields, and a version. The storage
//! adapter uses the version to decide whether an existing bucket must be
//! updated.
//!
//! The schema is a plain value. The setup code shares it behind an [Arc] and
//! never mutates it.
//!
//! # Example
//! ```
//! # use vmapi_buckets::schema::*;
//! let schema = Schema::from_json(r#"{
//!     "vms": {
//!         "name": "vmapi_vms",
//!         "schema": {
//!             "index": {
//!                 "uuid": { "type": "string", "unique": true },
//!                 "state": { "type": "string" }
//!             },
//!             "options": { "version": 2 }
//!         }
//!     }
//! }"#)?;
//! let vms = schema.get("vms").expect("vms bucket is configured");
//! assert_eq!(vms.name(), "vmapi_vms");
//! assert_eq!(vms.version(), 2);
//! # Ok::<(), Error>(())
//! ```
//!
//! [Arc]: std::sync::Arc

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The error type for schema loading and validation.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("cannot parse the bucket schema: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("bucket `{key}` has an invalid name `{name}`")]
    InvalidBucketName { key: String, name: String },
    #[error("bucket `{bucket}` has an invalid index name `{index}`")]
    InvalidIndexName { bucket: String, index: String },
    #[error("buckets `{first}` and `{second}` use the same name `{name}`")]
    DuplicateBucketName {
        first: String,
        second: String,
        name: String,
    },
}

/// The set of buckets to create.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    buckets: BTreeMap<String, BucketSpec>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the bucket stored under `key`.
    pub fn with_bucket<K: Into<String>>(mut self, key: K, bucket: BucketSpec) -> Self {
        self.buckets.insert(key.into(), bucket);
        self
    }

    /// Parses a schema from its JSON representation and validates it.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let schema: Self = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Converts a JSON value into a schema and validates it.
    pub fn from_value(value: serde_json::Value) -> Result<Self, Error> {
        let schema: Self = serde_json::from_value(value)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Returns the bucket stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&BucketSpec> {
        self.buckets.get(key)
    }

    /// Iterates over the buckets, ordered by key.
    pub fn buckets(&self) -> impl Iterator<Item = (&str, &BucketSpec)> {
        self.buckets.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Checks the names used in the schema.
    ///
    /// Bucket names and index names must be non-empty identifiers
    /// (`[A-Za-z_][A-Za-z0-9_]*`), and no two buckets may share a name.
    /// Backends may reject schemas for other reasons, this only catches
    /// mistakes that no backend accepts.
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for (key, bucket) in &self.buckets {
            if !is_identifier(&bucket.name) {
                return Err(Error::InvalidBucketName {
                    key: key.clone(),
                    name: bucket.name.clone(),
                });
            }
            if let Some(index) = bucket.schema.index.keys().find(|i| !is_identifier(i)) {
                return Err(Error::InvalidIndexName {
                    bucket: bucket.name.clone(),
                    index: index.clone(),
                });
            }
            if let Some(first) = seen.insert(bucket.name.as_str(), key.as_str()) {
                return Err(Error::DuplicateBucketName {
                    first: first.to_string(),
                    second: key.clone(),
                    name: bucket.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// The buckets used by the VM API.
    pub fn vmapi_default() -> Self {
        let string = || IndexSpec::new(IndexType::String);
        let number = || IndexSpec::new(IndexType::Number);
        let boolean = || IndexSpec::new(IndexType::Boolean);
        let strings = || IndexSpec::new(IndexType::StringArray);

        let vms = BucketSpec::new("vmapi_vms")
            .set_version(3)
            .set_index("uuid", string().set_unique(true))
            .set_index("owner_uuid", string())
            .set_index("image_uuid", string())
            .set_index("billing_id", string())
            .set_index("server_uuid", string())
            .set_index("package_name", string())
            .set_index("package_version", string())
            .set_index("tags", string())
            .set_index("brand", string())
            .set_index("state", string())
            .set_index("alias", string())
            .set_index("max_physical_memory", number())
            .set_index("ram", number())
            .set_index("create_timestamp", number())
            .set_index("last_modified", number())
            .set_index("destroyed", number())
            .set_index("docker", boolean())
            .set_index("internal_metadata_search_array", strings());
        let server_vms = BucketSpec::new("vmapi_server_vms")
            .set_version(1)
            .set_index("server_uuid", string());
        let role_tags = BucketSpec::new("vmapi_vm_role_tags")
            .set_version(1)
            .set_index("role_tags", strings());
        let migrations = BucketSpec::new("vmapi_vm_migrations")
            .set_version(1)
            .set_index("vm_uuid", string())
            .set_index("source_server_uuid", string())
            .set_index("target_server_uuid", string())
            .set_index("target_vm_uuid", string())
            .set_index("state", string())
            .set_index("created_timestamp", number());

        Self::new()
            .with_bucket("vms", vms)
            .with_bucket("server_vms", server_vms)
            .with_bucket("vm_role_tags", role_tags)
            .with_bucket("vm_migrations", migrations)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A single bucket: its name in the backend and its schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    name: String,
    #[serde(default)]
    schema: BucketSchema,
}

impl BucketSpec {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            schema: BucketSchema::default(),
        }
    }

    /// Sets the schema version.
    pub fn set_version(mut self, v: u32) -> Self {
        self.schema.options.version = v;
        self
    }

    /// Adds (or replaces) an indexed field.
    pub fn set_index<T: Into<String>>(mut self, field: T, index: IndexSpec) -> Self {
        self.schema.index.insert(field.into(), index);
        self
    }

    /// The bucket name in the storage backend.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.schema.options.version
    }

    /// The indexed fields, ordered by name.
    pub fn index(&self) -> &BTreeMap<String, IndexSpec> {
        &self.schema.index
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct BucketSchema {
    #[serde(default)]
    index: BTreeMap<String, IndexSpec>,
    #[serde(default)]
    options: BucketOptions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct BucketOptions {
    #[serde(default)]
    version: u32,
}

/// An indexed field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    #[serde(rename = "type")]
    kind: IndexType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    unique: bool,
}

impl IndexSpec {
    pub fn new(kind: IndexType) -> Self {
        Self {
            kind,
            unique: false,
        }
    }

    pub fn set_unique(mut self, v: bool) -> Self {
        self.unique = v;
        self
    }

    pub fn kind(&self) -> IndexType {
        self.kind
    }

    pub fn unique(&self) -> bool {
        self.unique
    }
}

/// The type of an indexed field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "[string]")]
    StringArray,
    #[serde(rename = "[number]")]
    NumberArray,
}
