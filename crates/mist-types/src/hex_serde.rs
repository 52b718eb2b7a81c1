/// Implements hex-string `Serialize`/`Deserialize` for a fixed-size byte
/// newtype exposing `to_hex` and `from_hex`.
///
/// Hex strings double as JSON map keys, which the wire format relies on.
macro_rules! impl_hex_serde {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                <$ty>::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
