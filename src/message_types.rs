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

//! Wire message type codes. Grouped the way the
//! client protocol groups them: control-bus, client-facing, and
//! internal State/Database Server traffic.

/// Internal bus control messages (always addressed to `CONTROL_CHANNEL`).
pub mod control {
    pub const MESSAGE: u16 = 1;
    pub const SET_CHANNEL: u16 = 2002;
    pub const REMOVE_CHANNEL: u16 = 2003;
    pub const SET_CON_NAME: u16 = 2004;
    pub const SET_CON_URL: u16 = 2005;
    pub const ADD_RANGE: u16 = 2006;
    pub const REMOVE_RANGE: u16 = 2007;
    pub const ADD_POST_REMOVE: u16 = 2008;
    pub const CLEAR_POST_REMOVE: u16 = 2009;
}

/// Client-facing message types.
pub mod client {
    pub const GO_GET_LOST: u16 = 4;
    pub const OBJECT_UPDATE_FIELD: u16 = 24;
    pub const OBJECT_DISABLE_RESP: u16 = 25;
    pub const OBJECT_DELETE_RESP: u16 = 27;
    pub const SET_ZONE: u16 = 29;
    pub const SET_SHARD: u16 = 31;
    pub const CREATE_OBJECT_REQUIRED: u16 = 34;
    pub const CREATE_OBJECT_REQUIRED_OTHER: u16 = 35;
    pub const HEARTBEAT: u16 = 52;

    pub const LOGIN: u16 = 1;
    pub const LOGIN_RESP: u16 = 2;
    pub const GET_AVATARS: u16 = 3;
    pub const GET_AVATARS_RESP: u16 = 5;
    pub const CREATE_AVATAR: u16 = 6;
    pub const CREATE_AVATAR_RESP: u16 = 7;
    pub const GET_SHARD_LIST: u16 = 8;
    pub const GET_SHARD_LIST_RESP: u16 = 9;
    pub const GET_FRIEND_LIST: u16 = 10;
    pub const GET_FRIEND_LIST_RESP: u16 = 11;
    pub const GET_FRIEND_DETAILS: u16 = 12;
    pub const GET_FRIEND_DETAILS_RESP: u16 = 13;
    pub const GET_AVATAR_DETAILS: u16 = 14;
    pub const GET_AVATAR_DETAILS_RESP: u16 = 15;
    pub const LOGIN_2: u16 = 16;
    pub const LOGIN_2_RESP: u16 = 17;
    pub const SET_AVATAR: u16 = 32;
    pub const DISCONNECT: u16 = 37;
    pub const CHANGE_IP_ADDRESS_RESP: u16 = 45;
    pub const GET_STATE: u16 = 46;
    pub const GET_STATE_RESP: u16 = 47;
    pub const DONE_SET_ZONE_RESP: u16 = 48;
    pub const DELETE_AVATAR: u16 = 49;
    pub const DELETE_AVATAR_RESP: u16 = 5;
    pub const FRIEND_ONLINE: u16 = 53;
    pub const FRIEND_OFFLINE: u16 = 54;
    pub const REMOVE_FRIEND: u16 = 56;
    pub const SERVER_UP: u16 = 57;
    pub const SERVER_DOWN: u16 = 58;
    pub const CHANGE_PASSWORD: u16 = 65;
    pub const SET_NAME_PATTERN: u16 = 67;
    pub const SET_NAME_PATTERN_ANSWER: u16 = 68;
    pub const SET_WISHNAME: u16 = 70;
    pub const SET_WISHNAME_RESP: u16 = 71;
    pub const SET_WISHNAME_CLEAR: u16 = 72;
    pub const SET_SECURITY: u16 = 73;

    pub const LOGIN_2_GREEN: u8 = 1;
    pub const LOGIN_2_PLAY_TOKEN: u8 = 2;
    pub const LOGIN_2_BLUE: u8 = 3;
    pub const LOGIN_3_DISL_TOKEN: u8 = 4;

    pub const LOGIN_TOONTOWN: u16 = 125;
    pub const LOGIN_TOONTOWN_RESP: u16 = 126;

    pub const ADD_INTEREST: u16 = 97;
    pub const REMOVE_INTEREST: u16 = 99;
    pub const DONE_INTEREST_RESP: u16 = 48;
    pub const OBJECT_LOCATION: u16 = 102;

    pub const DEBUG_SET_NAME: u16 = 201;
    pub const DEBUG_AUTHENTICATE_ADMIN: u16 = 202;

    /// Disconnect reason codes sent in a `GO_GET_LOST` payload.
    pub mod disconnect {
        pub const INVALID_MSGTYPE: u16 = 108;
        pub const NO_HEARTBEAT: u16 = 345;
        pub const ALREADY_LOGGED_IN: u16 = 346;
        pub const BAD_VERSION: u16 = 124;
        pub const BAD_DCHASH: u16 = 125;
        pub const INVALID_PLAY_TOKEN_TYPE: u16 = 284;
        pub const TRUNCATED_DATAGRAM: u16 = 109;
        pub const ANONYMOUS_VIOLATION: u16 = 113;
        pub const SHARD_CLOSED: u16 = 114;
    }
}

/// Internal messages the Client Agent sends/receives on its own channels.
pub mod client_agent {
    pub const DISCONNECT: u16 = 1000;
    pub const FRIEND_ONLINE: u16 = 1001;
    pub const FRIEND_OFFLINE: u16 = 1002;
}

/// State Server object protocol.
pub mod stateserver {
    pub const OBJECT_GENERATE_WITH_REQUIRED: u16 = 2000;
    pub const OBJECT_GENERATE_WITH_REQUIRED_OTHER: u16 = 2001;
    pub const OBJECT_DELETE_RAM: u16 = 2002;
    pub const OBJECT_UPDATE_FIELD: u16 = 2020;
    pub const OBJECT_UPDATE_FIELD_MULTIPLE: u16 = 2021;
    pub const OBJECT_SET_LOCATION: u16 = 2040;
    pub const OBJECT_ENTER_LOCATION_WITH_REQUIRED: u16 = 2041;
    pub const OBJECT_ENTER_LOCATION_WITH_REQUIRED_OTHER: u16 = 2042;
    pub const OBJECT_SET_OWNER: u16 = 2043;
    pub const OBJECT_CHANGING_OWNER: u16 = 2044;
    pub const OBJECT_LOCATION_ACK: u16 = 2045;
    pub const OBJECT_CHANGING_LOCATION: u16 = 2046;
    pub const OBJECT_SET_AI: u16 = 2050;
    pub const OBJECT_CHANGING_AI: u16 = 2051;
    pub const OBJECT_ENTER_AI_WITH_REQUIRED: u16 = 2052;
    pub const OBJECT_ENTER_AI_WITH_REQUIRED_OTHER: u16 = 2053;
    pub const OBJECT_SET_AI_RESP: u16 = 2054;
    pub const OBJECT_SET_ZONE: u16 = 2007;
    pub const OBJECT_SET_ZONE_RESP: u16 = 2008;
    pub const OBJECT_CHANGE_ZONE: u16 = 2009;
    pub const OBJECT_ENTER_OWNER_WITH_REQUIRED: u16 = 2062;
    pub const OBJECT_ENTER_OWNER_WITH_REQUIRED_OTHER: u16 = 2063;
    pub const OBJECT_GET_ZONES_OBJECTS: u16 = 2064;
    pub const OBJECT_GET_ZONES_OBJECTS_RESP: u16 = 2065;
    pub const OBJECT_GET_ZONES_OBJECTS_2: u16 = 2066;
    pub const OBJECT_GET_ZONES_OBJECTS_2_RESP: u16 = 2067;
    pub const OBJECT_CLEAR_WATCH: u16 = 2068;
    pub const ADD_SHARD: u16 = 2010;
    pub const REMOVE_SHARD: u16 = 2011;
    pub const UPDATE_SHARD: u16 = 2012;
    pub const GET_SHARD_ALL: u16 = 2013;
    pub const GET_SHARD_ALL_RESP: u16 = 2014;
}

/// Database Server protocol.
pub mod dbserver {
    pub const CREATE_OBJECT: u16 = 3000;
    pub const CREATE_OBJECT_RESP: u16 = 3001;
    pub const OBJECT_GET_FIELD: u16 = 3002;
    pub const OBJECT_GET_FIELD_RESP: u16 = 3003;
    pub const OBJECT_GET_FIELDS: u16 = 3004;
    pub const OBJECT_GET_FIELDS_RESP: u16 = 3005;
    pub const OBJECT_GET_ALL: u16 = 3006;
    pub const OBJECT_GET_ALL_RESP: u16 = 3007;
    pub const OBJECT_SET_FIELD: u16 = 3008;
    pub const OBJECT_SET_FIELDS: u16 = 3009;
    pub const OBJECT_SET_FIELD_IF_EQUALS: u16 = 3010;
    pub const OBJECT_SET_FIELD_IF_EQUALS_RESP: u16 = 3011;
    pub const OBJECT_SET_FIELDS_IF_EQUALS: u16 = 3012;
    pub const OBJECT_SET_FIELDS_IF_EQUALS_RESP: u16 = 3013;
    pub const OBJECT_SET_FIELD_IF_EMPTY: u16 = 3014;
    pub const OBJECT_SET_FIELD_IF_EMPTY_RESP: u16 = 3015;
    pub const OBJECT_DELETE_FIELD: u16 = 3016;
    pub const OBJECT_DELETE_FIELDS: u16 = 3017;
    pub const OBJECT_DELETE: u16 = 3018;
}
