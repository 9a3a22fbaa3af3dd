// Copyright (c) 2026, DoNet Edge Contributors.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3.
// You should have received a copy of this license along
// with this source code in a file named "LICENSE."
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

//! Operation FSMs: one-shot request/response flows
//! between a client and the Database Server, hosted on the client's
//! account or avatar channel. The manager enforces that at most one
//! operation runs per channel at a time.

use crate::database::{DatabaseInterface, FieldSet};
use crate::dc_schema;
use crate::globals::{Channel, DoId};
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Number of avatar slots a fresh account is created with.
const AVATAR_SLOT_COUNT: usize = 6;

/// Tracks which channels currently have a running operation, rejecting
/// a second one before it starts.
#[derive(Default)]
pub struct OperationManager {
    active: Mutex<HashSet<Channel>>,
}

impl OperationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `channel` for a new operation. Returns `false` if one is
    /// already running there.
    pub async fn try_begin(&self, channel: Channel) -> bool {
        self.active.lock().await.insert(channel)
    }

    pub async fn end(&self, channel: Channel) {
        self.active.lock().await.remove(&channel);
    }
}

/// Runs `body`, releasing the operation slot for `channel` on every
/// exit path (including an early return via `?`).
async fn with_operation_slot<T, F, Fut>(
    manager: &OperationManager,
    channel: Channel,
    body: F,
) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    if !manager.try_begin(channel).await {
        debug!("operations: channel {} already has an active operation.", channel);
        return None;
    }
    let result = body().await;
    manager.end(channel).await;
    Some(result)
}

#[derive(Debug, PartialEq, Eq)]
enum LoadAccountState {
    Start,
    QueryingAccount,
    CreatingAccount,
    Done,
}

pub struct LoadAccountResult {
    pub account_id: DoId,
    pub created: bool,
}

/// `LoadAccountFSM`: resolves a play token to an account id, creating a
/// fresh account object the first time a token is seen.
pub async fn load_account(
    db: &DatabaseInterface,
    manager: &OperationManager,
    login_channel: Channel,
    existing_account_id: Option<DoId>,
    play_token: &str,
) -> Option<LoadAccountResult> {
    with_operation_slot(manager, login_channel, || async move {
        let mut state = LoadAccountState::Start;

        if let Some(account_id) = existing_account_id {
            state = LoadAccountState::Done;
            let _ = state;
            return LoadAccountResult {
                account_id,
                created: false,
            };
        }

        state = LoadAccountState::CreatingAccount;
        debug!("LoadAccountFSM: {:?}", state);
        let mut fields = FieldSet::new();
        fields.insert(
            dc_schema::ACCOUNT_AV_SET.id,
            encode_doid_list(&vec![0; AVATAR_SLOT_COUNT]),
        );
        fields.insert(dc_schema::ACCOUNT_BLAST_NAME.id, play_token.as_bytes().to_vec());
        let created_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        fields.insert(dc_schema::ACCOUNT_CREATED.id, created_secs.to_le_bytes().to_vec());
        let account_id = db
            .create_object(dc_schema::ACCOUNT_DCLASS, fields)
            .await
            .unwrap_or(0);

        state = LoadAccountState::QueryingAccount;
        let _ = state;
        state = LoadAccountState::Done;
        debug!("LoadAccountFSM: {:?}", state);

        LoadAccountResult {
            account_id,
            created: true,
        }
    })
    .await
}

/// `RetrieveAvatarsFSM`: fetches the account's avatar set and a name
/// summary for each one.
pub async fn retrieve_avatars(
    db: &DatabaseInterface,
    manager: &OperationManager,
    account_channel: Channel,
    account_id: DoId,
) -> Option<Vec<(DoId, String)>> {
    with_operation_slot(manager, account_channel, || async move {
        let account_fields = db.get_all(account_id).await;
        let avatar_ids = decode_doid_list(account_fields.get(&dc_schema::ACCOUNT_AV_SET.id));

        let mut avatars = Vec::new();
        for avatar_id in avatar_ids {
            if avatar_id == 0 {
                continue;
            }
            let fields = db.get_all(avatar_id).await;
            let name = fields
                .get(&dc_schema::TOON_SET_NAME.id)
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            avatars.push((avatar_id, name));
        }
        avatars
    })
    .await
}

/// `CreateAvatarFSM`: creates a new `DistributedToon` and appends it to
/// the account's avatar set.
pub async fn create_avatar(
    db: &DatabaseInterface,
    manager: &OperationManager,
    account_channel: Channel,
    account_id: DoId,
    dna_string: Vec<u8>,
) -> Option<DoId> {
    with_operation_slot(manager, account_channel, || async move {
        let mut fields = FieldSet::new();
        fields.insert(dc_schema::TOON_SET_DNA_STRING.id, dna_string);
        let avatar_id = db
            .create_object(dc_schema::DISTRIBUTED_TOON_DCLASS, fields)
            .await
            .ok()?;

        let mut account_fields = db.get_all(account_id).await;
        let mut avatar_ids = decode_doid_list(account_fields.remove(&dc_schema::ACCOUNT_AV_SET.id));
        avatar_ids.push(avatar_id);
        let mut update = FieldSet::new();
        update.insert(dc_schema::ACCOUNT_AV_SET.id, encode_doid_list(&avatar_ids));
        db.set_fields(account_id, update);

        Some(avatar_id)
    })
    .await
    .flatten()
}

/// `LoadAvatarFSM`: loads an avatar's fields, sorted by field id to
/// match the order the State Server expects them in a generate
/// message.
pub async fn load_avatar(
    db: &DatabaseInterface,
    manager: &OperationManager,
    avatar_channel: Channel,
    avatar_id: DoId,
) -> Option<Vec<(u16, Vec<u8>)>> {
    with_operation_slot(manager, avatar_channel, || async move {
        let fields = db.get_all(avatar_id).await;
        let pairs: Vec<(u16, Vec<u8>)> = fields.into_iter().collect();
        dc_schema::sort_by_field_id(pairs)
    })
    .await
}

/// `LoadFriendsListFSM`: resolves a friends list to online/offline
/// presence, using the caller-supplied `is_online` probe (backed by the
/// Client Agent's live session table, not the Message Director).
pub async fn load_friends_list(
    db: &DatabaseInterface,
    manager: &OperationManager,
    avatar_channel: Channel,
    avatar_id: DoId,
    is_online: impl Fn(DoId) -> bool,
) -> Option<Vec<(DoId, bool)>> {
    with_operation_slot(manager, avatar_channel, || async move {
        let fields = db.get_all(avatar_id).await;
        let friend_ids = decode_doid_list(fields.get(&dc_schema::TOON_SET_FRIENDS_LIST.id));
        friend_ids
            .into_iter()
            .map(|id| (id, is_online(id)))
            .collect()
    })
    .await
}

/// `SetNameFSM`: stores a requested "wish name" pending approval. This
/// system has no moderation service, so the name is approved
/// immediately.
pub async fn set_wishname(
    db: &DatabaseInterface,
    manager: &OperationManager,
    avatar_channel: Channel,
    avatar_id: DoId,
    name: String,
) -> Option<bool> {
    with_operation_slot(manager, avatar_channel, || async move {
        let mut fields = FieldSet::new();
        fields.insert(dc_schema::TOON_SET_NAME.id, name.into_bytes());
        db.set_fields(avatar_id, fields);
        true
    })
    .await
}

/// A name dictionary is an external collaborator (the avatar name
/// generator); it resolves an index to a word fragment. Capitalisation
/// is the caller's concern, driven by the pattern's per-part flag.
pub trait NameDictionary: Send + Sync {
    fn resolve(&self, index: u16) -> String;
}

/// `SetNamePatternFSM`: assembles a four-part pattern name. Each part's
/// flag picks capitalized-first-letter vs. all-lowercase; empty parts
/// are dropped entirely rather than leaving a stray space. Parts 1 and
/// 2 are joined with a space to form the first name; parts 3 and 4 are
/// concatenated directly (no space) to form the last name; the two
/// halves are then joined with a single space, unless one is empty.
pub async fn set_name_pattern(
    db: &DatabaseInterface,
    manager: &OperationManager,
    avatar_channel: Channel,
    avatar_id: DoId,
    pattern: [(u16, bool); 4],
    dictionary: &dyn NameDictionary,
) -> Option<String> {
    with_operation_slot(manager, avatar_channel, || async move {
        let parts: Vec<String> = pattern
            .iter()
            .map(|(index, flag)| {
                let word = dictionary.resolve(*index);
                if *flag {
                    capitalize(&word)
                } else {
                    word.to_lowercase()
                }
            })
            .collect();

        let first_name = parts[..2]
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        let last_name: String = parts[2..].concat();
        let name = [first_name, last_name]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let mut fields = FieldSet::new();
        fields.insert(dc_schema::TOON_SET_NAME.id, name.clone().into_bytes());
        db.set_fields(avatar_id, fields);
        name
    })
    .await
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// `GetAvatarDetailsFSM`: fetches a single avatar's full field set for
/// display (e.g. a friend's profile card).
pub async fn get_avatar_details(
    db: &DatabaseInterface,
    manager: &OperationManager,
    requester_channel: Channel,
    avatar_id: DoId,
) -> Option<FieldSet> {
    with_operation_slot(manager, requester_channel, || async move {
        db.get_all(avatar_id).await
    })
    .await
}

/// `DeleteAvatarFSM`: removes an avatar id from its account's avatar
/// set. The avatar object itself is left in place; this never issues a
/// database delete.
pub async fn delete_avatar(
    db: &DatabaseInterface,
    manager: &OperationManager,
    account_channel: Channel,
    account_id: DoId,
    avatar_id: DoId,
) -> Option<bool> {
    with_operation_slot(manager, account_channel, || async move {
        let mut account_fields = db.get_all(account_id).await;
        let mut avatar_ids = decode_doid_list(account_fields.remove(&dc_schema::ACCOUNT_AV_SET.id));
        let before = avatar_ids.len();
        avatar_ids.retain(|id| *id != avatar_id);
        let removed = avatar_ids.len() != before;

        if removed {
            let mut update = FieldSet::new();
            update.insert(dc_schema::ACCOUNT_AV_SET.id, encode_doid_list(&avatar_ids));
            db.set_fields(account_id, update);
        }
        removed
    })
    .await
}

/// `SetAvatarZonesFSM`: persists the avatar's last-known zone/hood as
/// separate `OBJECT_SET_FIELD` calls rather than one combined update.
/// `setHoodsVisited` is append-if-missing: the hood is added to the
/// visited set only the first time the avatar enters it.
pub async fn set_avatar_zones(
    db: &DatabaseInterface,
    manager: &OperationManager,
    avatar_channel: Channel,
    avatar_id: DoId,
    last_hood: u32,
    default_zone: u32,
) -> Option<()> {
    with_operation_slot(manager, avatar_channel, || async move {
        let fields = db.get_all(avatar_id).await;
        let mut visited = decode_doid_list(fields.get(&dc_schema::TOON_SET_HOODS_VISITED.id));
        if !visited.contains(&last_hood) {
            visited.push(last_hood);
            let mut hoods = FieldSet::new();
            hoods.insert(dc_schema::TOON_SET_HOODS_VISITED.id, encode_doid_list(&visited));
            db.set_fields(avatar_id, hoods);
        }

        let mut hood = FieldSet::new();
        hood.insert(dc_schema::TOON_SET_LAST_HOOD.id, last_hood.to_le_bytes().to_vec());
        db.set_fields(avatar_id, hood);

        let mut zone = FieldSet::new();
        zone.insert(dc_schema::TOON_SET_DEFAULT_ZONE.id, default_zone.to_le_bytes().to_vec());
        db.set_fields(avatar_id, zone);
    })
    .await
}

fn decode_doid_list(bytes: Option<&Vec<u8>>) -> Vec<DoId> {
    let Some(bytes) = bytes else { return Vec::new() };
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

fn encode_doid_list(ids: &[DoId]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ids.len() * 4);
    for id in ids {
        out.extend_from_slice(&id.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn unbound_db(own: Channel, db_channel: Channel) -> Arc<DatabaseInterface> {
        let (tx, _rx) = mpsc::unbounded_channel();
        DatabaseInterface::new(own, db_channel, Duration::from_millis(20), tx)
    }

    #[tokio::test]
    async fn only_one_operation_runs_per_channel_at_a_time() {
        let manager = OperationManager::new();
        assert!(manager.try_begin(42).await);
        assert!(!manager.try_begin(42).await);
        manager.end(42).await;
        assert!(manager.try_begin(42).await);
    }

    #[tokio::test]
    async fn load_account_reuses_an_existing_account_id_without_touching_the_database() {
        let db = unbound_db(5000, 1002);
        let manager = OperationManager::new();
        let result = load_account(&db, &manager, 77, Some(55), "alice").await.unwrap();
        assert_eq!(result.account_id, 55);
        assert!(!result.created);
    }

    #[test]
    fn doid_list_round_trips_through_encode_decode() {
        let ids = vec![1, 2, 3];
        assert_eq!(decode_doid_list(Some(&encode_doid_list(&ids))), ids);
    }

    struct FixedDictionary;
    impl NameDictionary for FixedDictionary {
        fn resolve(&self, index: u16) -> String {
            match index {
                0 => "silly".into(),
                1 => "".into(),
                2 => "jelly".into(),
                3 => "bean".into(),
                _ => "".into(),
            }
        }
    }

    #[tokio::test]
    async fn name_pattern_concatenates_parts_three_and_four_without_a_space() {
        let db = unbound_db(5000, 1002);
        let manager = OperationManager::new();
        let name = set_name_pattern(
            &db,
            &manager,
            88,
            12345,
            [(0, true), (1, true), (2, true), (3, true)],
            &FixedDictionary,
        )
        .await
        .unwrap();
        assert!(name.ends_with("JellyBean"));
    }

    #[tokio::test]
    async fn name_pattern_lowercases_parts_whose_flag_is_false() {
        let db = unbound_db(5000, 1002);
        let manager = OperationManager::new();
        let name = set_name_pattern(
            &db,
            &manager,
            89,
            12346,
            [(0, false), (1, false), (2, false), (3, false)],
            &FixedDictionary,
        )
        .await
        .unwrap();
        assert_eq!(name, "silly jellybean");
    }

    #[tokio::test]
    async fn name_pattern_drops_empty_parts_instead_of_leaving_a_stray_space() {
        let db = unbound_db(5000, 1002);
        let manager = OperationManager::new();
        let name = set_name_pattern(
            &db,
            &manager,
            90,
            12347,
            [(0, true), (1, true), (2, true), (3, true)],
            &FixedDictionary,
        )
        .await
        .unwrap();
        assert_eq!(name, "Silly JellyBean");
    }
}
