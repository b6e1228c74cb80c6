//! Demo entities the virtual hub starts with.

/// `(entity_id, initial state)` of every seeded entity.
pub const DEMO_ENTITIES: &[(&str, &str)] = &[
    ("input_boolean.away", "off"),
    ("input_boolean.holiday", "off"),
    ("binary_sensor.hall_motion", "off"),
    ("input_select.house_mode", "Day"),
    ("sensor.pet_food_storage", "full"),
    ("person.resident", "home"),
    ("sensor.phone_distance", "0"),
    ("sensor.phone_direction_of_travel", "stationary"),
    ("zone.groceries", "off"),
    ("light.hall", "off"),
    ("light.living_room", "on"),
    ("light.kitchen", "off"),
    ("media_player.tv", "off"),
    ("media_player.soundbar", "off"),
    ("media_player.whole_house", "idle"),
    ("scene.living_room_morning", "unknown"),
    ("scene.living_room_day", "unknown"),
    ("scene.living_room_evening", "unknown"),
    ("scene.living_room_night", "unknown"),
];
