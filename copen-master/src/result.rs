//! Job outcomes
use copen_common::sdo::RawAbortCode;
use snafu::Snafu;

/// The outcome of a [`Job`](crate::Job)
///
/// `DeviceOffline`, `UnknownDevice`, `LoginFailed` and `StateChangeFailed` are never produced by
/// the worker. They are part of the vocabulary so that device drivers built on top of a client can
/// report through the same type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JobResult {
    /// The job completed successfully
    Ok,
    /// The job has not completed yet
    #[default]
    Waiting,
    /// The job kind cannot be executed
    UnknownJobType,
    /// The worker queue was full when the job was submitted
    QueueFull,
    /// No completed job was available
    QueueEmpty,
    /// The bus is not in a mode which allows transmission
    NoWriteAccess,
    /// A job parameter is outside its allowed range
    ParamRange,
    /// The read buffer filled up before the transfer completed
    BufferTooSmall,
    /// No valid response was received
    Timeout,
    /// The server aborted the transfer, or answered with an unexpected response
    SdoAccess {
        /// The abort code received
        abort_code: RawAbortCode,
    },
    /// A segment response had the wrong toggle bit or command
    SegmentMismatch,
    /// The device is not reachable
    DeviceOffline,
    /// The device is not the expected one
    UnknownDevice,
    /// Logging into the device failed
    LoginFailed,
    /// The device did not change into the requested state
    StateChangeFailed,
}

impl JobResult {
    /// True for `Ok`
    pub fn is_ok(&self) -> bool {
        *self == JobResult::Ok
    }

    /// Convert to a `Result`
    pub fn into_result(self) -> Result<(), JobError> {
        match self {
            JobResult::Ok => Ok(()),
            JobResult::Waiting => NotCompleteSnafu.fail(),
            JobResult::UnknownJobType => UnknownJobTypeSnafu.fail(),
            JobResult::QueueFull => QueueFullSnafu.fail(),
            JobResult::QueueEmpty => QueueEmptySnafu.fail(),
            JobResult::NoWriteAccess => NoWriteAccessSnafu.fail(),
            JobResult::ParamRange => ParamRangeSnafu.fail(),
            JobResult::BufferTooSmall => BufferTooSmallSnafu.fail(),
            JobResult::Timeout => TimeoutSnafu.fail(),
            JobResult::SdoAccess { abort_code } => SdoAccessSnafu { abort_code }.fail(),
            JobResult::SegmentMismatch => SegmentMismatchSnafu.fail(),
            JobResult::DeviceOffline => DeviceOfflineSnafu.fail(),
            JobResult::UnknownDevice => UnknownDeviceSnafu.fail(),
            JobResult::LoginFailed => LoginFailedSnafu.fail(),
            JobResult::StateChangeFailed => StateChangeFailedSnafu.fail(),
        }
    }
}

impl core::fmt::Display for JobResult {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            JobResult::Ok => "OK",
            JobResult::Waiting => "Waiting",
            JobResult::UnknownJobType => "Unknown job type",
            JobResult::QueueFull => "Queue full",
            JobResult::QueueEmpty => "Queue empty",
            JobResult::NoWriteAccess => "CAN bus not in active mode",
            JobResult::ParamRange => "Parameter out of range",
            JobResult::BufferTooSmall => "Buffer too small",
            JobResult::Timeout => "Timeout",
            JobResult::SdoAccess { .. } => "SDO access failed",
            JobResult::SegmentMismatch => "SDO segment mismatch",
            JobResult::DeviceOffline => "Device offline",
            JobResult::UnknownDevice => "Unknown device",
            JobResult::LoginFailed => "Login failed",
            JobResult::StateChangeFailed => "State change failed",
        };
        f.write_str(name)
    }
}

/// Error view of a job which did not complete successfully
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum JobError {
    /// The job has not completed
    #[snafu(display("Job not complete"))]
    NotComplete,
    /// The job kind cannot be executed
    #[snafu(display("Unknown job type"))]
    UnknownJobType,
    /// The worker queue was full
    #[snafu(display("Queue full"))]
    QueueFull,
    /// No completed job was available
    #[snafu(display("Queue empty"))]
    QueueEmpty,
    /// The bus is not in a mode which allows transmission
    #[snafu(display("CAN bus not in active mode"))]
    NoWriteAccess,
    /// A job parameter is outside its allowed range
    #[snafu(display("Parameter out of range"))]
    ParamRange,
    /// The read buffer filled up before the transfer completed
    #[snafu(display("Buffer too small"))]
    BufferTooSmall,
    /// No valid response was received
    #[snafu(display("Timeout"))]
    Timeout,
    /// The server aborted the transfer
    #[snafu(display("SDO access failed; {abort_code}"))]
    SdoAccess {
        /// The abort code received
        abort_code: RawAbortCode,
    },
    /// A segment response had the wrong toggle bit or command
    #[snafu(display("SDO segment mismatch"))]
    SegmentMismatch,
    /// The device is not reachable
    #[snafu(display("Device offline"))]
    DeviceOffline,
    /// The device is not the expected one
    #[snafu(display("Unknown device"))]
    UnknownDevice,
    /// Logging into the device failed
    #[snafu(display("Login failed"))]
    LoginFailed,
    /// The device did not change into the requested state
    #[snafu(display("State change failed"))]
    StateChangeFailed,
}
