use slotmap::new_key_type;

new_key_type! {
    /// Identifies a station (transformer) owned by the controller.
    pub struct StationId;

    /// Identifies a production unit (resource) owned by the controller.
    pub struct UnitId;
}
