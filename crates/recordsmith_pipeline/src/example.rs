//! `tf.train.Example` messages.
//!
//! Hand derived with prost, field numbers as in TensorFlow's
//! `example.proto` and `feature.proto`.

use prost::Message;
use std::collections::HashMap;

#[derive(Clone, PartialEq, Message)]
/// `tf.train.BytesList`
pub struct BytesList {
    /// Values
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub value: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
/// `tf.train.FloatList`
pub struct FloatList {
    /// Values
    #[prost(float, repeated, tag = "1")]
    pub value: Vec<f32>,
}

#[derive(Clone, PartialEq, Message)]
/// `tf.train.Int64List`
pub struct Int64List {
    /// Values
    #[prost(int64, repeated, tag = "1")]
    pub value: Vec<i64>,
}

#[derive(Clone, PartialEq, Message)]
/// `tf.train.Feature`
pub struct Feature {
    /// One of the three list kinds
    #[prost(oneof = "feature::Kind", tags = "1, 2, 3")]
    pub kind: Option<feature::Kind>,
}

/// Nested types of [`Feature`]
pub mod feature {
    /// Feature payload
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        /// Byte strings
        #[prost(message, tag = "1")]
        BytesList(super::BytesList),
        /// Floats
        #[prost(message, tag = "2")]
        FloatList(super::FloatList),
        /// Integers
        #[prost(message, tag = "3")]
        Int64List(super::Int64List),
    }
}

impl Feature {
    /// Single byte string feature
    #[must_use]
    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: Some(feature::Kind::BytesList(BytesList {
                value: vec![value.into()],
            })),
        }
    }

    /// Single integer feature
    #[must_use]
    pub fn int64(value: i64) -> Self {
        Self {
            kind: Some(feature::Kind::Int64List(Int64List { value: vec![value] })),
        }
    }
}

#[derive(Clone, PartialEq, Message)]
/// `tf.train.Features`
pub struct Features {
    /// Named features
    #[prost(map = "string, message", tag = "1")]
    pub feature: HashMap<String, Feature>,
}

#[derive(Clone, PartialEq, Message)]
/// `tf.train.Example`
pub struct Example {
    /// Feature map
    #[prost(message, optional, tag = "1")]
    pub features: Option<Features>,
}

impl Example {
    /// Example holding `features`
    #[must_use]
    pub fn new(features: impl IntoIterator<Item = (String, Feature)>) -> Self {
        Self {
            features: Some(Features {
                feature: features.into_iter().collect(),
            }),
        }
    }

    /// Look up a feature by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.features.as_ref()?.feature.get(name)
    }

    /// Serialized protobuf bytes
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int64_feature_wire_format() {
        // Int64List at field 3, its values packed at field 1
        let encoded = Feature::int64(7).encode_to_vec();
        assert_eq!(encoded, vec![0x1a, 0x03, 0x0a, 0x01, 0x07]);
    }

    #[test]
    fn test_bytes_feature_wire_format() {
        let encoded = Feature::bytes("ab").encode_to_vec();
        assert_eq!(encoded, vec![0x0a, 0x04, 0x0a, 0x02, b'a', b'b']);
    }

    #[test]
    fn test_example_decodes() {
        let example = Example::new([
            ("label".to_string(), Feature::int64(3)),
            ("split".to_string(), Feature::bytes("train")),
        ]);
        let decoded = Example::decode(example.to_bytes().as_slice()).unwrap();
        assert_eq!(decoded.get("label"), Some(&Feature::int64(3)));
        assert_eq!(decoded.get("split"), Some(&Feature::bytes("train")));
        assert!(decoded.get("image").is_none());
    }
}
