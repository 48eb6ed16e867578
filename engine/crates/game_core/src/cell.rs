use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One grid position: empty, a numeric power-of-two tile, or the special
/// marker tile ("M" on the wire). Markers never merge with numbers; a pair
/// of adjacent markers annihilates and clears its 3x3 surroundings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Empty,
    Number(u32),
    Marker,
}

impl Cell {
    pub fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn is_marker(self) -> bool {
        matches!(self, Cell::Marker)
    }

    /// Numeric value of the cell, or None for empty/marker cells.
    pub fn value(self) -> Option<u32> {
        match self {
            Cell::Number(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => write!(f, "."),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Marker => write!(f, "M"),
        }
    }
}

// The save files and the web clients exchange grids as mixed JSON arrays:
// numbers for tiles, 0 for empty, the string "M" for markers. The serde
// impls preserve that encoding exactly.

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Empty => serializer.serialize_u32(0),
            Cell::Number(n) => serializer.serialize_u32(*n),
            Cell::Marker => serializer.serialize_str("M"),
        }
    }
}

struct CellVisitor;

impl Visitor<'_> for CellVisitor {
    type Value = Cell;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative tile number or the string \"M\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Cell, E> {
        if v == 0 {
            Ok(Cell::Empty)
        } else if v <= u32::MAX as u64 {
            Ok(Cell::Number(v as u32))
        } else {
            Err(E::custom(format!("tile value {} out of range", v)))
        }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Cell, E> {
        u64::try_from(v)
            .map_err(|_| E::custom(format!("negative tile value {}", v)))
            .and_then(|v| self.visit_u64(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Cell, E> {
        if v == "M" {
            Ok(Cell::Marker)
        } else {
            Err(E::custom(format!("unrecognized tile {:?}", v)))
        }
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Cell, D::Error> {
        deserializer.deserialize_any(CellVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_mixed_row() {
        let row = vec![Cell::Empty, Cell::Number(2), Cell::Marker, Cell::Number(2048)];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"[0,2,"M",2048]"#);
    }

    #[test]
    fn deserialize_mixed_row() {
        let row: Vec<Cell> = serde_json::from_str(r#"[0,4,"M",16]"#).unwrap();
        assert_eq!(
            row,
            vec![Cell::Empty, Cell::Number(4), Cell::Marker, Cell::Number(16)]
        );
    }

    #[test]
    fn deserialize_rejects_unknown_string() {
        let result: Result<Cell, _> = serde_json::from_str(r#""X""#);
        assert!(result.is_err());
    }

    #[test]
    fn deserialize_rejects_negative() {
        let result: Result<Cell, _> = serde_json::from_str("-2");
        assert!(result.is_err());
    }

    #[test]
    fn value_accessor() {
        assert_eq!(Cell::Number(8).value(), Some(8));
        assert_eq!(Cell::Empty.value(), None);
        assert_eq!(Cell::Marker.value(), None);
    }
}
