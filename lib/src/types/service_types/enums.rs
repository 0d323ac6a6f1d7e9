// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

ua_enum! {
    MessageSecurityMode (default Invalid) {
        Invalid = 0,
        None = 1,
        Sign = 2,
        SignAndEncrypt = 3,
    }
}

ua_enum! {
    SecurityTokenRequestType (default Issue) {
        Issue = 0,
        Renew = 1,
    }
}

ua_enum! {
    TimestampsToReturn (default Both) {
        Source = 0,
        Server = 1,
        Both = 2,
        Neither = 3,
    }
}

ua_enum! {
    ApplicationType (default Client) {
        Server = 0,
        Client = 1,
        ClientAndServer = 2,
        DiscoveryServer = 3,
    }
}

ua_enum! {
    UserTokenType (default Anonymous) {
        Anonymous = 0,
        UserName = 1,
        Certificate = 2,
        IssuedToken = 3,
    }
}

ua_enum! {
    /// The value of `Server_ServerStatus_State`.
    ServerState (default Unknown) {
        Running = 0,
        Failed = 1,
        NoConfiguration = 2,
        Suspended = 3,
        Shutdown = 4,
        Test = 5,
        CommunicationFault = 6,
        Unknown = 7,
    }
}

/// Node attributes that can be read. Not sent as an enum, `ReadValueId` carries the raw id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AttributeId {
    NodeId = 1,
    NodeClass = 2,
    BrowseName = 3,
    DisplayName = 4,
    Description = 5,
    WriteMask = 6,
    UserWriteMask = 7,
    IsAbstract = 8,
    Symmetric = 9,
    InverseName = 10,
    ContainsNoLoops = 11,
    EventNotifier = 12,
    Value = 13,
    DataType = 14,
    ValueRank = 15,
    ArrayDimensions = 16,
    AccessLevel = 17,
    UserAccessLevel = 18,
    MinimumSamplingInterval = 19,
    Historizing = 20,
    Executable = 21,
    UserExecutable = 22,
}
