#![allow(missing_docs)] // Don't require docs for test code

//! A scripted transport for dry runs and tests.
//!
//! Read responses are queued up front; every command issued through the
//! transport is recorded so a test can assert on ordering and payloads
//! after the fact.

use std::collections::VecDeque;

use crate::protocol::{DfuCommand, DfuState, DfuStatus};
use crate::transport::{CommandTransport, TransportError};

/// A command observed by the mock, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Read(DfuCommand),
    Write(DfuCommand, Vec<u8>),
}

/// Transport double with queued read responses and a full operation log.
#[derive(Debug, Default)]
pub struct MockTransport {
    operations: Vec<Operation>,
    responses: VecDeque<(DfuCommand, Vec<u8>)>,
    fail_write: Option<DfuCommand>,
}

impl MockTransport {
    pub fn new() -> MockTransport {
        MockTransport::default()
    }

    /// Queue the raw response for the next read of `command`.
    pub fn push_response(&mut self, command: DfuCommand, bytes: Vec<u8>) {
        self.responses.push_back((command, bytes));
    }

    /// Queue a GETSTATE response.
    pub fn push_state(&mut self, state: DfuState) {
        self.push_response(DfuCommand::GetState, state.to_wire().to_le_bytes().to_vec());
    }

    /// Queue a GETSTATUS response.
    pub fn push_status(&mut self, status: DfuStatus, state: DfuState, poll_timeout_msec: u32) {
        let mut bytes = Vec::with_capacity(12);
        bytes.extend_from_slice(&status.to_wire().to_le_bytes());
        bytes.extend_from_slice(&state.to_wire().to_le_bytes());
        bytes.extend_from_slice(&poll_timeout_msec.to_le_bytes());
        self.push_response(DfuCommand::GetStatus, bytes);
    }

    /// Queue a GET_ERROR_INFO response.
    pub fn push_error_info(&mut self, info: u32) {
        self.push_response(DfuCommand::GetErrorInfo, info.to_le_bytes().to_vec());
    }

    /// Make the next write of `command` fail with a transport error.
    pub fn fail_write_of(&mut self, command: DfuCommand) {
        self.fail_write = Some(command);
    }

    /// Every command issued so far, in order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// The payloads of all recorded writes of `command`.
    pub fn writes_of(&self, command: DfuCommand) -> Vec<Vec<u8>> {
        self.operations
            .iter()
            .filter_map(|op| match op {
                Operation::Write(cmd, payload) if *cmd == command => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }
}

impl CommandTransport for MockTransport {
    fn read_command(
        &mut self,
        command: DfuCommand,
        len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        self.operations.push(Operation::Read(command));

        match self.responses.pop_front() {
            Some((expected, bytes)) => {
                assert_eq!(
                    expected, command,
                    "mock transport: read of {command} but next scripted response is for {expected}"
                );
                Ok(bytes)
            }
            // unscripted read behaves like a device that returned nothing
            None => Err(TransportError::NotEnoughBytesRead {
                expected: len,
                received: 0,
            }),
        }
    }

    fn write_command(&mut self, command: DfuCommand, payload: &[u8]) -> Result<(), TransportError> {
        self.operations
            .push(Operation::Write(command, payload.to_vec()));

        if self.fail_write == Some(command) {
            self.fail_write = None;
            return Err(TransportError::NotEnoughBytesWritten {
                expected: payload.len(),
                written: 0,
            });
        }

        Ok(())
    }
}
