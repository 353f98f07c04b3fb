use tracing::{debug, info, warn};

use crate::models::{default_organizations, Desk, DeskRole, Organization, RoomConfig, RoomSlot};

/// The generator always works on exactly this many organizations.
pub const ORGANIZATION_SLOTS: usize = 5;

/// Pads (or trims) the organization list to exactly five entries.
///
/// An empty list is replaced by the default teams. Short lists get synthetic
/// placeholders; both cases are configuration errors handled by defaulting.
pub fn pad_organizations(organizations: &[Organization]) -> Vec<Organization> {
    if organizations.is_empty() {
        warn!("no organizations declared, using default organizations");
        return default_organizations();
    }

    let mut padded: Vec<Organization> = organizations.to_vec();

    if padded.len() > ORGANIZATION_SLOTS {
        warn!(
            declared = padded.len(),
            "only the first {} organizations get desks, ignoring the rest", ORGANIZATION_SLOTS
        );
        padded.truncate(ORGANIZATION_SLOTS);
    }

    while padded.len() < ORGANIZATION_SLOTS {
        let number = padded.len() + 1;
        warn!(number, "padding organization list with a placeholder");
        padded.push(Organization::placeholder(number));
    }

    padded
}

fn slot_for_position(index: usize) -> RoomSlot {
    match index {
        0 | 1 => RoomSlot::Alpha,
        2 | 3 => RoomSlot::Beta,
        _ => RoomSlot::Executive,
    }
}

/// Generates the ordered desk list for an organization list.
///
/// Organizations 1-2 fill the first declared room, 3-4 the second, and the
/// fifth becomes the executive organization in the third room with
/// CEO/CTO/COO/assistant desks. This is a fixed business rule rather than a
/// general N-room generator.
pub fn generate_desks(organizations: &[Organization], rooms: &[RoomConfig]) -> Vec<Desk> {
    let padded = pad_organizations(organizations);
    let mut desks = Vec::with_capacity(ORGANIZATION_SLOTS * 4);

    for (index, org) in padded.iter().enumerate() {
        let number = index + 1;
        let slot = slot_for_position(index);
        let (room_id, room_name) = match rooms.get(slot.ordinal()) {
            Some(room) => (room.id.clone(), room.name.clone()),
            None => (
                slot.default_room_id().to_string(),
                slot.default_room_name().to_string(),
            ),
        };
        let org_name = if org.name.trim().is_empty() {
            format!("Org-{number:02}")
        } else {
            org.name.clone()
        };

        let roles = if slot == RoomSlot::Executive {
            DeskRole::EXECUTIVE
        } else {
            DeskRole::TEAM
        };

        for (role_index, role) in roles.iter().enumerate() {
            let desk_id = if slot == RoomSlot::Executive {
                format!("desk-exec-{role_index:02}")
            } else {
                format!("desk-{number:02}{role_index:02}")
            };

            let desk = Desk {
                desk_id,
                org_id: format!("org-{number:02}"),
                org_number: number,
                org_name: org_name.clone(),
                role: *role,
                slot,
                room_id: room_id.clone(),
                room_name: room_name.clone(),
                directory_name: role.directory_name(number),
                title: format!("{} - {} - {}", org_name, role.display_title(), room_name),
            };
            debug!(desk_id = %desk.desk_id, agent_id = %desk.agent_id(), title = %desk.title, "generated desk");
            desks.push(desk);
        }
    }

    info!(count = desks.len(), "generated desk mappings");
    desks
}

/// Groups desks by room id, keeping generation order inside each room and
/// first-appearance order between rooms.
pub fn group_by_room(desks: &[Desk]) -> Vec<(String, Vec<Desk>)> {
    let mut groups: Vec<(String, Vec<Desk>)> = Vec::new();
    for desk in desks {
        match groups.iter_mut().find(|(room_id, _)| *room_id == desk.room_id) {
            Some((_, list)) => list.push(desk.clone()),
            None => groups.push((desk.room_id.clone(), vec![desk.clone()])),
        }
    }
    groups
}
