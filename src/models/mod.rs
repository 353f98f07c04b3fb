mod desk;
mod organization;

pub use desk::{Desk, DeskRole, RoomSlot};
pub use organization::{default_organizations, default_rooms, Organization, RoomConfig};
