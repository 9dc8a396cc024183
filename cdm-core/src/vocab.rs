//! Closed vocabularies shared by every layer.
//!
//! Each enum round-trips through its canonical string form. Unknown strings
//! are a [`CdmError::UnknownVariant`], never a silent default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CdmError;

/// Declares a closed string vocabulary with `as_str`, `ALL`, `Display`,
/// `FromStr` and string-valued serde impls.
macro_rules! closed_vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical string form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CdmError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(CdmError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

closed_vocabulary! {
    /// Data kind of a CDM concept.
    DataKind, "data kind" {
        Integer => "integer",
        Float => "float",
        String => "string",
        Boolean => "boolean",
        Enum => "enum",
        Timestamp => "timestamp",
        Coordinate => "coordinate",
        Identifier => "identifier",
        Bits => "bits",
    }
}

impl DataKind {
    /// Whether a value range is meaningful for this kind.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Float | Self::Coordinate | Self::Timestamp | Self::Bits
        )
    }
}

closed_vocabulary! {
    /// Physical units known to the unit table.
    Unit, "unit" {
        Meter => "m",
        Kilometer => "km",
        Foot => "ft",
        NauticalMile => "nm",
        Radian => "rad",
        Degree => "deg",
        Second => "s",
        Millisecond => "ms",
        Microsecond => "us",
        MeterPerSecond => "m/s",
        Knot => "kn",
        Hertz => "Hz",
        Celsius => "°C",
        Kelvin => "K",
    }
}

/// Unit families. Conversions never cross a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitFamily {
    Length,
    Angle,
    Time,
    Velocity,
    Frequency,
    Temperature,
}

impl UnitFamily {
    /// SI pivot used for two-hop conversions inside the family.
    pub fn pivot(&self) -> Unit {
        match self {
            Self::Length => Unit::Meter,
            Self::Angle => Unit::Radian,
            Self::Time => Unit::Second,
            Self::Velocity => Unit::MeterPerSecond,
            Self::Frequency => Unit::Hertz,
            Self::Temperature => Unit::Kelvin,
        }
    }
}

impl Unit {
    /// Family the unit converts within.
    pub fn family(&self) -> UnitFamily {
        match self {
            Self::Meter | Self::Kilometer | Self::Foot | Self::NauticalMile => UnitFamily::Length,
            Self::Radian | Self::Degree => UnitFamily::Angle,
            Self::Second | Self::Millisecond | Self::Microsecond => UnitFamily::Time,
            Self::MeterPerSecond | Self::Knot => UnitFamily::Velocity,
            Self::Hertz => UnitFamily::Frequency,
            Self::Celsius | Self::Kelvin => UnitFamily::Temperature,
        }
    }
}

closed_vocabulary! {
    /// Coordinate reference frames.
    CoordinateFrame, "coordinate frame" {
        Wgs84 => "WGS84",
        /// North-East-Down.
        Ned => "NED",
        /// East-North-Up.
        Enu => "ENU",
        Body => "BODY",
        Magnetic => "MAGNETIC",
        True => "TRUE",
    }
}

closed_vocabulary! {
    /// Message standards the engine mediates between. `Cdm` names the
    /// canonical intermediate form itself.
    MessageStandard, "message standard" {
        MilStd6016 => "MIL-STD-6016",
        MavLink => "MAVLink",
        Mqtt => "MQTT",
        Generic => "Generic",
        Cdm => "CDM",
    }
}

closed_vocabulary! {
    /// Wire-level field types of semantic fields.
    FieldType, "field type" {
        Integer => "integer",
        Float => "float",
        String => "string",
        Boolean => "boolean",
        Bytes => "bytes",
        Enum => "enum",
        Timestamp => "timestamp",
        Coordinate => "coordinate",
        Identifier => "identifier",
    }
}

closed_vocabulary! {
    /// Semantic categories of cross-standard fields.
    SemanticCategory, "semantic category" {
        Identification => "identification",
        Position => "position",
        Status => "status",
        Command => "command",
        Sensor => "sensor",
        Communication => "communication",
        Timing => "timing",
        Navigation => "navigation",
        Weapon => "weapon",
        Metadata => "metadata",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_strings() {
        assert_eq!("m/s".parse::<Unit>().unwrap(), Unit::MeterPerSecond);
        assert_eq!("°C".parse::<Unit>().unwrap(), Unit::Celsius);
        assert_eq!(
            "MIL-STD-6016".parse::<MessageStandard>().unwrap(),
            MessageStandard::MilStd6016
        );
        assert_eq!("bits".parse::<DataKind>().unwrap(), DataKind::Bits);
    }

    #[test]
    fn unknown_strings_are_errors() {
        let err = "quaternion".parse::<DataKind>().unwrap_err();
        assert!(matches!(
            err,
            CdmError::UnknownVariant { kind: "data kind", .. }
        ));
        assert!("mavlink".parse::<MessageStandard>().is_err());
    }

    #[test]
    fn serde_uses_canonical_strings() {
        let json = serde_json::to_string(&CoordinateFrame::Ned).unwrap();
        assert_eq!(json, "\"NED\"");
        let parsed: SemanticCategory = serde_json::from_str("\"weapon\"").unwrap();
        assert_eq!(parsed, SemanticCategory::Weapon);
        assert!(serde_json::from_str::<FieldType>("\"decimal\"").is_err());
    }

    #[test]
    fn every_variant_round_trips() {
        for unit in Unit::ALL {
            assert_eq!(unit.as_str().parse::<Unit>().unwrap(), *unit);
        }
        for standard in MessageStandard::ALL {
            assert_eq!(standard.to_string().parse::<MessageStandard>().unwrap(), *standard);
        }
    }

    #[test]
    fn pivots_follow_si() {
        assert_eq!(Unit::Foot.family().pivot(), Unit::Meter);
        assert_eq!(Unit::Degree.family().pivot(), Unit::Radian);
        assert_eq!(Unit::Knot.family().pivot(), Unit::MeterPerSecond);
    }
}
