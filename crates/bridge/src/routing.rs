use bigskies_core::topic;

/// Method classification drives which topic namespace a bridge request
/// lands on: read-only state (`status/`), imperative commands
/// (`control/`), and persisted settings (`config/`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MethodClass {
    Status,
    Control,
    Config,
}

/// Telescope methods listed exhaustively, mirroring the ASCOM Alpaca
/// `ITelescopeV3` surface. Every other device type falls back to
/// `control/{device_type}/{method}`.
const TELESCOPE_METHODS: &[(&str, MethodClass)] = &[
    ("connected", MethodClass::Status),
    ("rightascension", MethodClass::Status),
    ("declination", MethodClass::Status),
    ("altitude", MethodClass::Status),
    ("azimuth", MethodClass::Status),
    ("athome", MethodClass::Status),
    ("atpark", MethodClass::Status),
    ("slewing", MethodClass::Status),
    ("tracking", MethodClass::Status),
    ("siderealtime", MethodClass::Status),
    ("utcdate", MethodClass::Status),
    ("slewtocoordinates", MethodClass::Control),
    ("slewtocoordinatesasync", MethodClass::Control),
    ("slewtoaltaz", MethodClass::Control),
    ("slewtoaltazasync", MethodClass::Control),
    ("synctocoordinates", MethodClass::Control),
    ("synctoaltaz", MethodClass::Control),
    ("park", MethodClass::Control),
    ("unpark", MethodClass::Control),
    ("abortslew", MethodClass::Control),
    ("findhome", MethodClass::Control),
    ("moveaxis", MethodClass::Control),
    ("pulseguide", MethodClass::Control),
    ("setpark", MethodClass::Control),
    ("trackingrate", MethodClass::Config),
    ("guideratedeclination", MethodClass::Config),
    ("guiderarightascension", MethodClass::Config),
    ("doesrefraction", MethodClass::Config),
    ("siteelevation", MethodClass::Config),
    ("sitelatitude", MethodClass::Config),
    ("sitelongitude", MethodClass::Config),
];

fn telescope_class(method: &str) -> Option<MethodClass> {
    let method = method.to_ascii_lowercase();
    TELESCOPE_METHODS.iter().find(|(name, _)| *name == method).map(|(_, class)| *class)
}

/// Resolve `(device_type, device_number, method)` to the bus topic a
/// request should be published on. Telescope methods use the declarative
/// table above; every other device type defaults to
/// `control/{device_type}/{method}`; methods the table does not recognize
/// (for telescope or otherwise) default to `status/get`.
pub fn resolve_topic(device_type: &str, device_number: u32, method: &str) -> String {
    let resource = format!("{device_type}/{device_number}");

    if device_type.eq_ignore_ascii_case("telescope") {
        return match telescope_class(method) {
            Some(MethodClass::Status) => topic::build(&["status", &resource]),
            Some(MethodClass::Control) => topic::build(&["control", &resource]),
            Some(MethodClass::Config) => topic::build(&["config", &resource]),
            None => topic::build(&["status", "get"]),
        };
    }

    topic::build(&["control", device_type, method])
}

/// The topic the bridge subscribes on to receive the response for a given
/// `request_id` (spec §6: `bigskies/coordinator/ascom/response/{request_id}`).
pub fn response_topic(request_id: uuid::Uuid) -> String {
    topic::build(&["ascom", "response", &request_id.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telescope_status_method_maps_to_status_topic() {
        assert_eq!(resolve_topic("telescope", 0, "rightascension"), "bigskies/coordinator/status/telescope/0");
    }

    #[test]
    fn telescope_control_method_maps_to_control_topic() {
        assert_eq!(resolve_topic("telescope", 0, "park"), "bigskies/coordinator/control/telescope/0");
    }

    #[test]
    fn telescope_config_method_maps_to_config_topic() {
        assert_eq!(resolve_topic("telescope", 0, "trackingrate"), "bigskies/coordinator/config/telescope/0");
    }

    #[test]
    fn unknown_telescope_method_defaults_to_status_get() {
        assert_eq!(resolve_topic("telescope", 0, "warpdrive"), "bigskies/coordinator/status/get");
    }

    #[test]
    fn method_lookup_is_case_insensitive() {
        assert_eq!(resolve_topic("telescope", 0, "Park"), resolve_topic("telescope", 0, "park"));
    }

    #[test]
    fn non_telescope_device_defaults_to_control_device_method() {
        assert_eq!(resolve_topic("camera", 1, "startexposure"), "bigskies/coordinator/control/camera/startexposure");
    }

    #[test]
    fn response_topic_is_keyed_by_request_id() {
        let id = uuid::Uuid::nil();
        assert_eq!(response_topic(id), "bigskies/coordinator/ascom/response/00000000-0000-0000-0000-000000000000");
    }
}
