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

//! Compiled dclass field tables. Parsing `.dc`
//! files is out of scope; this module is the baked-in equivalent of
//! what a DC parser would hand back for the two dclasses this system
//! reads and writes fields on. Each entry is `(field id, name)`; field
//! ids double as sort keys, matching the ordering the State Server
//! expects when a generate message lists "required" fields.

use crate::globals::{DClassId, FieldId};

pub struct FieldSpec {
    pub id: FieldId,
    pub name: &'static str,
}

pub const ACCOUNT_DCLASS: DClassId = 1;
pub const DISTRIBUTED_TOON_DCLASS: DClassId = 2;

pub const ACCOUNT_AV_SET: FieldSpec = FieldSpec { id: 1, name: "ACCOUNT_AV_SET" };
pub const ACCOUNT_BLAST_NAME: FieldSpec = FieldSpec { id: 2, name: "BLAST_NAME" };
pub const ACCOUNT_BIRTH_DATE: FieldSpec = FieldSpec { id: 3, name: "BIRTH_DATE" };
pub const ACCOUNT_CREATED: FieldSpec = FieldSpec { id: 4, name: "CREATED" };
pub const ACCOUNT_FIRST_NAME: FieldSpec = FieldSpec { id: 5, name: "FIRST_NAME" };
pub const ACCOUNT_LAST_LOGIN: FieldSpec = FieldSpec { id: 6, name: "LAST_LOGIN" };
pub const ACCOUNT_LAST_NAME: FieldSpec = FieldSpec { id: 7, name: "LAST_NAME" };
pub const ACCOUNT_PLAYED_MINUTES: FieldSpec = FieldSpec { id: 8, name: "PLAYED_MINUTES" };
pub const ACCOUNT_PLAYED_MINUTES_PERIOD: FieldSpec =
    FieldSpec { id: 9, name: "PLAYED_MINUTES_PERIOD" };
pub const ACCOUNT_HOUSE_ID_SET: FieldSpec = FieldSpec { id: 10, name: "HOUSE_ID_SET" };
pub const ACCOUNT_ESTATE_ID: FieldSpec = FieldSpec { id: 11, name: "ESTATE_ID" };

pub const ACCOUNT_FIELDS: &[&FieldSpec] = &[
    &ACCOUNT_AV_SET,
    &ACCOUNT_BLAST_NAME,
    &ACCOUNT_BIRTH_DATE,
    &ACCOUNT_CREATED,
    &ACCOUNT_FIRST_NAME,
    &ACCOUNT_LAST_LOGIN,
    &ACCOUNT_LAST_NAME,
    &ACCOUNT_PLAYED_MINUTES,
    &ACCOUNT_PLAYED_MINUTES_PERIOD,
    &ACCOUNT_HOUSE_ID_SET,
    &ACCOUNT_ESTATE_ID,
];

pub const TOON_SET_NAME: FieldSpec = FieldSpec { id: 20, name: "setName" };
pub const TOON_SET_DNA_STRING: FieldSpec = FieldSpec { id: 21, name: "setDNAString" };
pub const TOON_SET_POS_INDEX: FieldSpec = FieldSpec { id: 22, name: "setPosIndex" };
pub const TOON_SET_FRIENDS_LIST: FieldSpec = FieldSpec { id: 23, name: "setFriendsList" };
pub const TOON_SET_HOODS_VISITED: FieldSpec = FieldSpec { id: 24, name: "setHoodsVisited" };
pub const TOON_SET_LAST_HOOD: FieldSpec = FieldSpec { id: 25, name: "setLastHood" };
pub const TOON_SET_DEFAULT_ZONE: FieldSpec = FieldSpec { id: 26, name: "setDefaultZone" };
pub const TOON_SET_COMMON_CHAT_FLAGS: FieldSpec =
    FieldSpec { id: 27, name: "setCommonChatFlags" };
pub const TOON_SET_TROPHY_SCORE: FieldSpec = FieldSpec { id: 28, name: "setTrophyScore" };

pub const DISTRIBUTED_TOON_FIELDS: &[&FieldSpec] = &[
    &TOON_SET_NAME,
    &TOON_SET_DNA_STRING,
    &TOON_SET_POS_INDEX,
    &TOON_SET_FRIENDS_LIST,
    &TOON_SET_HOODS_VISITED,
    &TOON_SET_LAST_HOOD,
    &TOON_SET_DEFAULT_ZONE,
    &TOON_SET_COMMON_CHAT_FLAGS,
    &TOON_SET_TROPHY_SCORE,
];

/// Sorts `(field id, value)` pairs by field id, matching the order a
/// real DC-compiled generate message must present fields in.
pub fn sort_by_field_id<T>(mut fields: Vec<(FieldId, T)>) -> Vec<(FieldId, T)> {
    fields.sort_by_key(|(id, _)| *id);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_fields_by_id_regardless_of_input_order() {
        let fields = vec![(28u16, "c"), (20u16, "a"), (24u16, "b")];
        let sorted = sort_by_field_id(fields);
        assert_eq!(
            sorted.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![20, 24, 28]
        );
    }
}
