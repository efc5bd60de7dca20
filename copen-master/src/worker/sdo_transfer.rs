//! Expedited and segmented SDO transfers
use copen_common::{
    constants::values::BUS_COLLISION,
    sdo::{AbortCode, RawAbortCode, SdoDecodeError, SdoRequest, SdoResponse},
    CanId, NodeId,
};

use super::Link;
use crate::{job::SdoJob, result::JobResult};

type Response = Result<SdoResponse, SdoDecodeError>;

/// Send a request and wait for any frame on the response identifier
fn request(link: &mut Link, req: SdoRequest) -> Option<Response> {
    let msg = req.to_can_message(CanId::Std(link.tx_id));
    link.transact(Some(msg), |_| true)
        .map(|resp| SdoResponse::try_from(&resp.data))
}

fn send_abort(link: &Link, sdo: &SdoJob, code: AbortCode) {
    let msg = SdoRequest::abort(sdo.index, sdo.subindex, code).to_can_message(CanId::Std(link.tx_id));
    link.send(msg);
}

fn validate(link: &Link, sdo: &SdoJob, size: usize) -> Option<JobResult> {
    if !link.can_transmit() {
        Some(JobResult::NoWriteAccess)
    } else if NodeId::new(sdo.node_id).is_err() || link.rx_id == 0 || size == 0 {
        Some(JobResult::ParamRange)
    } else {
        None
    }
}

fn timed_out(link: &Link, sdo: &mut SdoJob) -> JobResult {
    send_abort(link, sdo, AbortCode::SdoTimeout);
    sdo.error = AbortCode::SdoTimeout as u32;
    log::debug!(
        "SDO #{} 0x{:04x}.{:02x}: no response, {} bytes transferred",
        sdo.node_id,
        sdo.index,
        sdo.subindex,
        sdo.bytes_transferred
    );
    JobResult::Timeout
}

/// Handle a response to an initiate request which is not the expected confirmation
fn initiate_failed(sdo: &mut SdoJob, resp: Response) -> JobResult {
    sdo.error = match resp {
        Ok(SdoResponse::Abort { abort_code, .. }) => abort_code,
        _ => BUS_COLLISION,
    };
    let abort_code = RawAbortCode::from(sdo.error);
    log::debug!(
        "SDO #{} 0x{:04x}.{:02x}: initiate failed, {}",
        sdo.node_id,
        sdo.index,
        sdo.subindex,
        abort_code
    );
    JobResult::SdoAccess { abort_code }
}

fn server_abort(sdo: &mut SdoJob, code: u32) -> JobResult {
    sdo.error = code;
    let abort_code = RawAbortCode::from(code);
    log::debug!(
        "SDO #{} 0x{:04x}.{:02x}: aborted by server after {} bytes, {}",
        sdo.node_id,
        sdo.index,
        sdo.subindex,
        sdo.bytes_transferred,
        abort_code
    );
    JobResult::SdoAccess { abort_code }
}

fn mismatch(link: &Link, sdo: &mut SdoJob) -> JobResult {
    log::debug!(
        "SDO #{} 0x{:04x}.{:02x}: segment mismatch after {} bytes",
        sdo.node_id,
        sdo.index,
        sdo.subindex,
        sdo.bytes_transferred
    );
    send_abort(link, sdo, AbortCode::ToggleNotAlternated);
    sdo.error = AbortCode::ToggleNotAlternated as u32;
    JobResult::SegmentMismatch
}

fn overflow(link: &Link, sdo: &mut SdoJob, abort: bool) -> JobResult {
    log::debug!(
        "SDO #{} 0x{:04x}.{:02x}: buffer too small, {} bytes read",
        sdo.node_id,
        sdo.index,
        sdo.subindex,
        sdo.bytes_transferred
    );
    if abort {
        send_abort(link, sdo, AbortCode::OutOfMemory);
    }
    sdo.error = AbortCode::OutOfMemory as u32;
    JobResult::BufferTooSmall
}

/// Append received bytes to the buffer, returning false if they did not all fit
fn store(sdo: &mut SdoJob, data: &[u8]) -> bool {
    let start = sdo.bytes_transferred;
    let len = data.len().min(sdo.capacity - start);
    sdo.buffer[start..start + len].copy_from_slice(&data[..len]);
    sdo.bytes_transferred += len;
    len == data.len()
}

/// Read an object from the server into the job buffer
pub(super) fn upload(link: &mut Link, sdo: &mut SdoJob) -> JobResult {
    if let Some(result) = validate(link, sdo, sdo.capacity) {
        return result;
    }
    sdo.buffer.clear();
    sdo.buffer.resize(sdo.capacity, 0);
    sdo.bytes_transferred = 0;
    sdo.content_size = None;
    sdo.error = 0;

    let Some(resp) = request(link, SdoRequest::initiate_upload(sdo.index, sdo.subindex)) else {
        return timed_out(link, sdo);
    };
    let (n, e, s, data) = match resp {
        Ok(SdoResponse::ConfirmUpload {
            n,
            e,
            s,
            index,
            sub,
            data,
        }) if index == sdo.index && sub == sdo.subindex => (n, e, s, data),
        other => return initiate_failed(sdo, other),
    };

    if e {
        let len = 4 - n as usize;
        sdo.content_size = Some(len as u32);
        if !store(sdo, &data[..len]) {
            return overflow(link, sdo, true);
        }
        return JobResult::Ok;
    }

    sdo.content_size = s.then(|| u32::from_le_bytes(data));
    let mut toggle = false;
    loop {
        let Some(resp) = request(link, SdoRequest::upload_segment_request(toggle)) else {
            return timed_out(link, sdo);
        };
        match resp {
            Ok(SdoResponse::UploadSegment { t, n, c, data }) if t == toggle => {
                let len = 7 - n as usize;
                if !store(sdo, &data[..len]) {
                    // After the last segment the server has nothing left to abort
                    return overflow(link, sdo, !c);
                }
                if c {
                    return JobResult::Ok;
                }
                toggle = !toggle;
            }
            Ok(SdoResponse::Abort { abort_code, .. }) => return server_abort(sdo, abort_code),
            _ => return mismatch(link, sdo),
        }
    }
}

/// Write the job buffer to an object on the server
pub(super) fn download(link: &mut Link, sdo: &mut SdoJob) -> JobResult {
    let len = sdo.buffer.len();
    if let Some(result) = validate(link, sdo, len) {
        return result;
    }
    sdo.bytes_transferred = 0;
    sdo.error = 0;

    let expedited = !sdo.size_indicated || len <= 4;
    let initiate = if expedited {
        SdoRequest::expedited_download(
            sdo.index,
            sdo.subindex,
            &sdo.buffer[..len.min(4)],
            sdo.size_indicated,
        )
    } else {
        SdoRequest::initiate_download(sdo.index, sdo.subindex, Some(len as u32))
    };

    let Some(resp) = request(link, initiate) else {
        return timed_out(link, sdo);
    };
    match resp {
        Ok(SdoResponse::ConfirmDownload { index, sub })
            if index == sdo.index && sub == sdo.subindex => {}
        other => return initiate_failed(sdo, other),
    }

    if expedited {
        sdo.bytes_transferred = len.min(4);
        return JobResult::Ok;
    }

    let mut toggle = false;
    let mut offset = 0;
    loop {
        let end = (offset + 7).min(len);
        let last = end == len;
        let segment = SdoRequest::download_segment(toggle, last, &sdo.buffer[offset..end]);
        let Some(resp) = request(link, segment) else {
            return timed_out(link, sdo);
        };
        match resp {
            Ok(SdoResponse::ConfirmDownloadSegment { t }) if t == toggle => {
                offset = end;
                sdo.bytes_transferred = end;
                if last {
                    return JobResult::Ok;
                }
                toggle = !toggle;
            }
            Ok(SdoResponse::Abort { abort_code, .. }) => return server_abort(sdo, abort_code),
            _ => return mismatch(link, sdo),
        }
    }
}
