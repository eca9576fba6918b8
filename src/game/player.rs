//! Player record and the score-ordered roster

use serde::Serialize;

use crate::protocol::PlayerRecord;

/// A player as seen by this handheld
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub id: u8,
    pub name: String,
    pub health: u8,
    pub max_health: u8,
    pub score: u8,
    /// 0 means no team
    pub team_id: u8,
    /// Damage this player's shots deal
    pub damage: u8,
    pub bullets_left: u8,
    pub max_bullets: u8,
}

impl Player {
    /// Create a player at full health with a full magazine
    pub fn new(id: u8, name: impl Into<String>, max_health: u8, max_bullets: u8) -> Self {
        Self {
            id,
            name: name.into(),
            health: max_health,
            max_health,
            score: 0,
            team_id: 0,
            damage: 0,
            bullets_left: max_bullets,
            max_bullets,
        }
    }

    /// Build a roster entry from a snapshot row
    ///
    /// The maxima are widened when the server reports a larger value so the
    /// health and bullet bounds always hold.
    pub fn from_record(record: &PlayerRecord, max_health: u8, max_bullets: u8) -> Self {
        let mut player = Self::new(record.id, record.name.clone(), max_health, max_bullets);
        player.apply_record(record);
        player
    }

    /// Overwrite every server-owned field from a snapshot row
    pub fn apply_record(&mut self, record: &PlayerRecord) {
        self.name = record.name.clone();
        self.max_health = self.max_health.max(record.health);
        self.max_bullets = self.max_bullets.max(record.bullets_left);
        self.health = record.health;
        self.score = record.score;
        self.team_id = record.team_id;
        self.damage = record.damage;
        self.bullets_left = record.bullets_left;
    }

    /// Take the server's view of name, health, score, team and damage.
    /// Bullets stay local: only the gun knows how many were fired.
    pub fn sync_from(&mut self, other: &Player) {
        self.name = other.name.clone();
        self.health = other.health.min(self.max_health);
        self.score = other.score;
        self.team_id = other.team_id;
        self.damage = other.damage;
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Spend a bullet; false if the magazine is empty
    pub fn shoot(&mut self) -> bool {
        if self.bullets_left == 0 {
            return false;
        }
        self.bullets_left -= 1;
        true
    }

    pub fn reload(&mut self) {
        self.bullets_left = self.max_bullets;
    }

    pub fn take_damage(&mut self, damage: u8) {
        self.health = self.health.saturating_sub(damage);
    }

    pub fn add_score(&mut self, points: u8) {
        self.score = self.score.saturating_add(points);
    }

    pub fn respawn(&mut self) {
        self.health = self.max_health;
        self.bullets_left = self.max_bullets;
    }
}

/// All players of the match, highest score first
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u8) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub(crate) fn len(&self) -> usize {
        self.players.len()
    }

    /// Merge snapshot rows by id (update in place or insert), then re-sort.
    /// Players missing from the snapshot are kept.
    pub fn merge(&mut self, records: &[PlayerRecord], max_health: u8, max_bullets: u8) {
        for record in records {
            match self.players.iter_mut().find(|p| p.id == record.id) {
                Some(existing) => existing.apply_record(record),
                None => self
                    .players
                    .push(Player::from_record(record, max_health, max_bullets)),
            }
        }
        // stable, so equal scores keep their arrival order
        self.players.sort_by(|a, b| b.score.cmp(&a.score));
    }
}
