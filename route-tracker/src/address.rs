//! Reverse-geocoding seam used by the map view
//!
//! Only the interface lives here; lookups are provided by the host platform.

/// Fallback shown when a point has no known address
pub const ADDRESS_NOT_FOUND: &str = "Address not found";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("no address found")]
    NotFound,
}

/// Resolves a coordinate to a human-readable address
pub trait AddressLookup {
    fn address_of(&self, latitude: f64, longitude: f64) -> Result<String, LookupError>;
}

/// Address for a tapped point, or a fixed fallback string
pub fn describe_or_fallback(lookup: &dyn AddressLookup, latitude: f64, longitude: f64) -> String {
    match lookup.address_of(latitude, longitude) {
        Ok(address) => address,
        Err(e) => {
            log::debug!("Address lookup for {},{} failed: {}", latitude, longitude, e);
            ADDRESS_NOT_FOUND.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneStreet;

    impl AddressLookup for OneStreet {
        fn address_of(&self, latitude: f64, _longitude: f64) -> Result<String, LookupError> {
            if latitude > 0.0 {
                Ok("1 Main St".to_string())
            } else {
                Err(LookupError::NotFound)
            }
        }
    }

    #[test]
    fn test_fallback_on_not_found() {
        assert_eq!(describe_or_fallback(&OneStreet, 1.0, 0.0), "1 Main St");
        assert_eq!(describe_or_fallback(&OneStreet, -1.0, 0.0), ADDRESS_NOT_FOUND);
    }
}
