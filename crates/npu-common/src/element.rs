// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element types of graph arguments.

/// Enumerates the element precisions a compiled network argument can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 16-bit IEEE 754 floating point.
    F16,
    /// 16-bit brain floating point.
    BF16,
    /// 8-bit signed integer.
    I8,
    /// 8-bit unsigned integer.
    U8,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
}

impl ElementType {
    /// Returns the size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            ElementType::F32 | ElementType::I32 => 4,
            ElementType::F16 | ElementType::BF16 => 2,
            ElementType::I8 | ElementType::U8 => 1,
            ElementType::I64 => 8,
        }
    }

    /// Returns a human-readable label for this element type.
    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::F32 => "f32",
            ElementType::F16 => "f16",
            ElementType::BF16 => "bf16",
            ElementType::I8 => "i8",
            ElementType::U8 => "u8",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
        }
    }

    /// Parses a label such as `"f32"` or `"float16"`.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "f32" | "float32" => Some(ElementType::F32),
            "f16" | "float16" => Some(ElementType::F16),
            "bf16" | "bfloat16" => Some(ElementType::BF16),
            "i8" | "int8" => Some(ElementType::I8),
            "u8" | "uint8" => Some(ElementType::U8),
            "i32" | "int32" => Some(ElementType::I32),
            "i64" | "int64" => Some(ElementType::I64),
            _ => None,
        }
    }

    pub(crate) fn to_safetensors(self) -> safetensors::Dtype {
        match self {
            ElementType::F32 => safetensors::Dtype::F32,
            ElementType::F16 => safetensors::Dtype::F16,
            ElementType::BF16 => safetensors::Dtype::BF16,
            ElementType::I8 => safetensors::Dtype::I8,
            ElementType::U8 => safetensors::Dtype::U8,
            ElementType::I32 => safetensors::Dtype::I32,
            ElementType::I64 => safetensors::Dtype::I64,
        }
    }

    pub(crate) fn from_safetensors(dtype: safetensors::Dtype) -> Option<Self> {
        match dtype {
            safetensors::Dtype::F32 => Some(ElementType::F32),
            safetensors::Dtype::F16 => Some(ElementType::F16),
            safetensors::Dtype::BF16 => Some(ElementType::BF16),
            safetensors::Dtype::I8 => Some(ElementType::I8),
            safetensors::Dtype::U8 => Some(ElementType::U8),
            safetensors::Dtype::I32 => Some(ElementType::I32),
            safetensors::Dtype::I64 => Some(ElementType::I64),
            _ => None,
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
