use crate::PlayerId;

/// Global set of online player ids.
pub const ONLINE_SET_KEY: &str = "online-players";

pub fn presence_key(player_id: PlayerId) -> String {
    format!("presence:{}", player_id)
}
