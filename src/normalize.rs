use crate::error::{ApiError, ApiResult};
use crate::model::remote::RemoteEntity;

/// Converts one raw gateway record into a [`RemoteEntity`].
///
/// Fails with [`ApiError::Validation`] when `entity_id` is not of the form
/// `domain.object_id`.
pub fn normalize_state(raw: &hass::State) -> ApiResult<RemoteEntity> {
    let Some((domain, _)) = raw.split_entity_id() else {
        return Err(ApiError::Validation(format!(
            "malformed entity id {:?}",
            raw.entity_id
        )));
    };

    let entity_id = raw.entity_id.trim().to_string();

    Ok(RemoteEntity {
        domain: domain.to_string(),
        device_class: raw.device_class().map(ToString::to_string),
        friendly_name: raw
            .friendly_name()
            .map_or_else(|| entity_id.clone(), ToString::to_string),
        state: raw.state.clone(),
        unit_of_measurement: raw.unit_of_measurement().map(ToString::to_string),
        last_updated: raw.last_updated,
        entity_id,
    })
}

/// Normalizes a full states payload, preserving gateway order.
///
/// Malformed records are dropped so one bad entity cannot break grouping
/// downstream.
#[must_use]
pub fn normalize(raw: &[hass::State]) -> Vec<RemoteEntity> {
    raw.iter()
        .filter_map(|state| match normalize_state(state) {
            Ok(ent) => Some(ent),
            Err(err) => {
                log::debug!("Dropping gateway state record: {err}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use hass::State;

    use crate::error::ErrorKind;
    use crate::normalize::{normalize, normalize_state};

    fn payload() -> Vec<State> {
        vec![
            State::new("switch.fan", "off"),
            State::new("broken", "on"),
            State::new("sensor.temp", "23.1")
                .with_attribute("device_class", "temperature")
                .with_attribute("unit_of_measurement", "°C")
                .with_attribute("friendly_name", "Tent temperature"),
            State::new("", "on"),
            State::new("automation.mist_cycle", "on"),
        ]
    }

    #[test]
    fn derives_domain_and_defaults_name() {
        let ent = normalize_state(&State::new("switch.fan", "off")).unwrap();
        assert_eq!(ent.domain, "switch");
        assert_eq!(ent.friendly_name, "switch.fan");
        assert_eq!(ent.device_class, None);
        assert_eq!(ent.state, "off");
    }

    #[test]
    fn copies_attributes() {
        let ent = normalize_state(&payload()[2]).unwrap();
        assert_eq!(ent.domain, "sensor");
        assert_eq!(ent.device_class.as_deref(), Some("temperature"));
        assert_eq!(ent.unit_of_measurement.as_deref(), Some("°C"));
        assert_eq!(ent.friendly_name, "Tent temperature");
    }

    #[test]
    fn malformed_record_is_validation_error() {
        let err = normalize_state(&State::new("broken", "on")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn drops_malformed_and_keeps_order() {
        let ids: Vec<String> = normalize(&payload())
            .into_iter()
            .map(|x| x.entity_id)
            .collect();
        assert_eq!(ids, ["switch.fan", "sensor.temp", "automation.mist_cycle"]);
    }

    #[test]
    fn idempotent() {
        let raw = payload();
        assert_eq!(normalize(&raw), normalize(&raw));
    }
}
