//! Embedded YAML assets so defaults never depend on the working directory.
//! Provides stable names looked up by `get_yaml(name)`.

#[inline]
pub fn get_yaml(name: &str) -> Option<&'static str> {
    match name {
        "default_config" => Some(include_str!("../../../assets/config/default.yaml")),
        "rate_profiles" => Some(include_str!("../../../assets/profiles/rates.yaml")),
        "event_cards" => Some(include_str!("../../../assets/events/cards.yaml")),
        _ => None,
    }
}
