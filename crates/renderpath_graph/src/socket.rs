// SPDX-License-Identifier: MIT OR Apache-2.0
//! Socket definitions for node inputs/outputs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SocketId(pub Uuid);

impl SocketId {
    /// Create a new random socket ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SocketId {
    fn default() -> Self {
        Self::new()
    }
}

/// Socket direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketDirection {
    /// Input socket
    Input,
    /// Output socket
    Output,
}

/// Data type that can flow through sockets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketType {
    /// The render pipeline up to this point; chaining Stage sockets
    /// defines execution order
    Stage,
    /// Render target reference
    Target,
    /// String value
    String,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// Boolean value
    Bool,
    /// Color (RGBA)
    Color,
}

impl SocketType {
    /// Check if this type can connect to another type.
    ///
    /// Both ends of an edge must carry the same type. Stage edges encode
    /// control flow and Target edges encode resource references, so there
    /// are no implicit conversions between socket types.
    pub fn can_connect_to(&self, other: &SocketType) -> bool {
        self == other
    }
}

/// Literal value that can be stored in a socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SocketValue {
    /// String
    String(String),
    /// Integer
    Int(i32),
    /// Float
    Float(f32),
    /// Boolean
    Bool(bool),
    /// Color (RGBA)
    Color([f32; 4]),
}

impl SocketValue {
    /// Get the socket type for this value
    pub fn socket_type(&self) -> SocketType {
        match self {
            Self::String(_) => SocketType::String,
            Self::Int(_) => SocketType::Int,
            Self::Float(_) => SocketType::Float,
            Self::Bool(_) => SocketType::Bool,
            Self::Color(_) => SocketType::Color,
        }
    }

    /// Get the string value, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the integer value, if this is an integer
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the float value, if this is a float
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the boolean value, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the color value, if this is a color
    pub fn as_color(&self) -> Option<[f32; 4]> {
        match self {
            Self::Color(v) => Some(*v),
            _ => None,
        }
    }
}

/// A socket on a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Socket {
    /// Unique socket ID
    pub id: SocketId,
    /// Socket name
    pub name: String,
    /// Socket direction
    pub direction: SocketDirection,
    /// Data type
    pub socket_type: SocketType,
    /// Literal default value (for inputs); doubles as the node-local
    /// parameter storage when the input is left unconnected
    pub default_value: Option<SocketValue>,
    /// Whether this input must be bound by an edge or a default before
    /// the owning node can compile
    pub required: bool,
}

impl Socket {
    /// Create a new input socket
    pub fn input(name: impl Into<String>, socket_type: SocketType) -> Self {
        Self {
            id: SocketId::new(),
            name: name.into(),
            direction: SocketDirection::Input,
            socket_type,
            default_value: None,
            required: false,
        }
    }

    /// Create a new output socket
    pub fn output(name: impl Into<String>, socket_type: SocketType) -> Self {
        Self {
            id: SocketId::new(),
            name: name.into(),
            direction: SocketDirection::Output,
            socket_type,
            default_value: None,
            required: false,
        }
    }

    /// Set the default value
    pub fn with_default(mut self, value: SocketValue) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Check if a connection to another socket is valid.
    ///
    /// Sockets connect output-to-input with exactly matching types.
    /// Inputs accept at most one producer; outputs may fan out to any
    /// number of consumers.
    pub fn can_connect(&self, other: &Socket) -> bool {
        if self.direction == other.direction {
            return false;
        }
        self.socket_type.can_connect_to(&other.socket_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_type_agreement() {
        assert!(SocketType::Stage.can_connect_to(&SocketType::Stage));
        assert!(SocketType::Target.can_connect_to(&SocketType::Target));
        assert!(!SocketType::Stage.can_connect_to(&SocketType::Target));
        assert!(!SocketType::Int.can_connect_to(&SocketType::Float));
        assert!(!SocketType::Color.can_connect_to(&SocketType::Bool));
    }

    #[test]
    fn test_value_socket_type() {
        assert_eq!(
            SocketValue::String("mesh".into()).socket_type(),
            SocketType::String
        );
        assert_eq!(SocketValue::Int(4).socket_type(), SocketType::Int);
        assert_eq!(
            SocketValue::Color([0.0, 0.0, 0.0, 1.0]).socket_type(),
            SocketType::Color
        );
    }

    #[test]
    fn test_can_connect_requires_opposite_directions() {
        let out = Socket::output("Stage", SocketType::Stage);
        let inp = Socket::input("Stage", SocketType::Stage);
        assert!(out.can_connect(&inp));
        assert!(!out.can_connect(&Socket::output("Stage", SocketType::Stage)));
        assert!(!out.can_connect(&Socket::input("Target", SocketType::Target)));
    }
}
