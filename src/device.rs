//! Known device definitions, loaded from the embedded device database.
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::constants::RESPONSE_FRAME_SIZE;

/// Device family sharing one USB vendor id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Family {
    pub name: String,
    #[serde(deserialize_with = "parse_hex_u16")]
    pub vendor_id: u16,
    pub description: String,
    pub variants: Vec<KnownDevice>,
}

/// Represents a supported controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownDevice {
    pub name: String,
    /// Filled in from the family.
    #[serde(default)]
    pub vendor_id: u16,
    #[serde(deserialize_with = "parse_hex_u16")]
    pub product_id: u16,
    /// Size of one inbound response frame.
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
}

impl ::std::fmt::Display for KnownDevice {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        write!(
            f,
            "{}({:04x}:{:04x})",
            self.name, self.vendor_id, self.product_id
        )
    }
}

pub struct DeviceDB {
    families: Vec<Family>,
}

impl DeviceDB {
    pub fn load() -> Result<Self> {
        let mut families: Vec<Family> =
            vec![serde_yaml::from_str(include_str!("../devices/corsair-link.yaml"))?];
        for family in &mut families {
            for device in &mut family.variants {
                device.vendor_id = family.vendor_id;
            }
        }
        Ok(DeviceDB { families })
    }

    pub fn devices(&self) -> impl Iterator<Item = &KnownDevice> {
        self.families.iter().flat_map(|f| f.variants.iter())
    }

    pub fn find(&self, vendor_id: u16, product_id: u16) -> Option<&KnownDevice> {
        self.devices()
            .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)
    }

    pub fn find_device(vendor_id: u16, product_id: u16) -> Result<KnownDevice> {
        let db = DeviceDB::load()?;
        let device = db.find(vendor_id, product_id).cloned().ok_or_else(|| {
            anyhow::format_err!(
                "Unsupported device {:04x}:{:04x}",
                vendor_id,
                product_id
            )
        })?;
        log::debug!("Found device: {}", device);
        Ok(device)
    }
}

fn default_frame_size() -> usize {
    RESPONSE_FRAME_SIZE
}

fn parse_hex_u16<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|e| serde::de::Error::custom(format!("error while parsing {:?}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CORSAIR_VENDOR_ID;

    #[test]
    fn database_loads() {
        let db = DeviceDB::load().unwrap();
        let hydro = db.find(CORSAIR_VENDOR_ID, 0x0c04).unwrap();
        assert_eq!(hydro.name, "Corsair Hydro Series (HID)");
        assert_eq!(hydro.frame_size, 32);
        assert_eq!(hydro.to_string(), "Corsair Hydro Series (HID)(1b1c:0c04)");
    }

    #[test]
    fn unknown_devices_are_rejected() {
        assert!(DeviceDB::find_device(CORSAIR_VENDOR_ID, 0xffff).is_err());
        assert!(DeviceDB::find_device(0x4348, 0x0c04).is_err());
    }

    #[test]
    fn hex_and_decimal_ids() {
        let family: Family = serde_yaml::from_str(
            "name: x\nvendor_id: \"6940\"\ndescription: y\nvariants:\n  - name: z\n    product_id: \"0X0C04\"\n",
        )
        .unwrap();
        assert_eq!(family.vendor_id, 0x1b1c);
        assert_eq!(family.variants[0].product_id, 0x0c04);
        assert_eq!(family.variants[0].frame_size, RESPONSE_FRAME_SIZE);
    }
}
