// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use crate::{
    client::{
        session::{
            process_service_result, process_unexpected_response, session_debug, session_error,
        },
        Session,
    },
    core::supported_message::SupportedMessage,
    types::{DataValue, NodeId, ReadRequest, ReadValueId, StatusCode, TimestampsToReturn},
};

/// Max age in milliseconds used by [`Session::read_node`].
pub const READ_NODE_MAX_AGE: f64 = 2000.0;

impl Session {
    /// Reads the value of nodes by sending a [`ReadRequest`] to the server.
    ///
    /// See OPC UA Part 4 - Services 5.10.2 for complete description of the service and error responses.
    ///
    /// # Arguments
    ///
    /// * `nodes_to_read` - A list of [`ReadValueId`] to be read by the server.
    /// * `timestamps_to_return` - The [`TimestampsToReturn`] for each node, Both, Server, Source or None
    /// * `max_age` - The maximum age of value to read in milliseconds. If 0 the server will attempt
    ///   to read a new value from the datasource.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<DataValue>)` - A list of [`DataValue`] corresponding to each read operation.
    /// * `Err(StatusCode)` - Request failed, [Status code](StatusCode) is the reason for failure.
    ///
    pub async fn read(
        &self,
        nodes_to_read: &[ReadValueId],
        timestamps_to_return: TimestampsToReturn,
        max_age: f64,
    ) -> Result<Vec<DataValue>, StatusCode> {
        if nodes_to_read.is_empty() {
            session_error!(self, "read(), was not supplied with any nodes to read");
            return Err(StatusCode::BadNothingToDo);
        }

        session_debug!(self, "read() requested to read nodes {:?}", nodes_to_read);
        let request = ReadRequest {
            request_header: self.make_request_header(),
            max_age,
            timestamps_to_return,
            nodes_to_read: Some(nodes_to_read.to_vec()),
        };
        let response = self.send(request).await?;
        if let SupportedMessage::ReadResponse(response) = response {
            session_debug!(self, "read(), success");
            process_service_result(&response.response_header)?;
            Ok(response.results.unwrap_or_default())
        } else {
            session_error!(self, "read() value failed");
            Err(process_unexpected_response(response))
        }
    }

    /// Read the value attribute of a single node, asking for both timestamps.
    ///
    /// The status of the read itself is in the returned [`DataValue`], only a failure of the
    /// request, or a response without results, is an `Err`.
    pub async fn read_node(&self, node_id: &NodeId) -> Result<DataValue, StatusCode> {
        let results = self
            .read(
                &[ReadValueId::from(node_id)],
                TimestampsToReturn::Both,
                READ_NODE_MAX_AGE,
            )
            .await?;
        results.into_iter().next().ok_or_else(|| {
            session_error!(self, "read_node() got no result for {}", node_id);
            StatusCode::BadUnknownResponse
        })
    }
}
