//! Traceroute results.

use serde::{Deserialize, Serialize};

/// Reserved node number for hops the firmware could not identify
/// (unknown or encrypted relays).
pub const UNKNOWN_NODE: u32 = 0xFFFF_FFFF;

/// A traceroute response, correlated by `request_id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracerouteExchange {
    /// Packet id of the request this answers.
    pub request_id: Option<u32>,
    /// Node that produced the response.
    pub from: Option<String>,
    /// Intermediate hops towards the destination.
    pub route: Vec<u32>,
    /// Intermediate hops on the way back.
    pub route_back: Vec<u32>,
    pub snr_towards: Vec<f64>,
    pub snr_back: Vec<f64>,
}

/// Drops hops that are not real relay nodes.
pub fn filter_hops(hops: impl IntoIterator<Item = u32>) -> Vec<u32> {
    hops.into_iter()
        .filter(|&hop| hop != UNKNOWN_NODE && hop != 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_hops() {
        assert_eq!(filter_hops([5, 4_294_967_295, 0, 9]), vec![5, 9]);
        assert!(filter_hops([0, UNKNOWN_NODE]).is_empty());
        assert_eq!(filter_hops([1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn test_exchange_json_keys() {
        let exchange = TracerouteExchange {
            request_id: Some(9),
            from: Some("!00000001".into()),
            route: vec![2],
            ..TracerouteExchange::default()
        };
        let json = serde_json::to_value(&exchange).unwrap();
        assert_eq!(json["requestId"], 9);
        assert_eq!(json["routeBack"], serde_json::json!([]));
        assert_eq!(json["snrTowards"], serde_json::json!([]));
    }
}
