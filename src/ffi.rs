//! FFI bindings for Synheart Relay
//!
//! This module provides C-compatible functions for driving a relay session from
//! the host platform. The host forwards sensor callbacks into the session and
//! supplies the wireless link as a pair of C callbacks.
//!
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `relay_free_string`.

use std::cell::RefCell;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::slice;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::runtime::{Builder, Runtime};

use crate::clock::SystemClock;
use crate::config::RelayConfig;
use crate::connection::{CapabilityProbe, ConnectDecision, HealthServiceConnection};
use crate::error::{RelayError, TransportError};
use crate::observer::SessionEvent;
use crate::session::{AggregationSession, MotionSensor};
use crate::sync::SyncFacade;
use crate::transport::{Peer, Transport};
use crate::types::{RawHeartRateEvent, SensorAccuracy, TrackingMode};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Serialize a value for the host, recording failures as the last error
fn json_to_cstr<T: serde::Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn mode_code(mode: TrackingMode) -> i32 {
    match mode {
        TrackingMode::Stopped => 0,
        TrackingMode::Full => 1,
        TrackingMode::HeartRateOnly => 2,
    }
}

// ============================================================================
// Host Callbacks
// ============================================================================

/// Lists connected peers.
///
/// Returns a JSON array of `{"id": .., "display_name": ..}` objects owned by
/// the host and valid until the next call with the same context, or NULL if
/// discovery failed.
pub type RelayListPeersFn = unsafe extern "C" fn(context: *mut c_void) -> *const c_char;

/// Sends `payload` to `peer_id` on `channel`. Returns 0 once the peer
/// acknowledges, non-zero on failure. May block.
pub type RelaySendFn = unsafe extern "C" fn(
    context: *mut c_void,
    peer_id: *const c_char,
    channel: *const c_char,
    payload: *const u8,
    payload_len: usize,
) -> i32;

/// Receives one session event as JSON, valid only for the duration of the call.
pub type RelayObserverFn = unsafe extern "C" fn(context: *mut c_void, event_json: *const c_char);

/// Wireless link supplied by the host.
///
/// The callbacks are invoked from the session's worker threads, so `context`
/// must be safe to use from any thread and outlive the session.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RelayTransportCallbacks {
    pub context: *mut c_void,
    pub list_peers: Option<RelayListPeersFn>,
    pub send: Option<RelaySendFn>,
}

// SAFETY: the host guarantees `context` is usable from any thread (see the
// `RelayTransportCallbacks` contract).
unsafe impl Send for RelayTransportCallbacks {}
unsafe impl Sync for RelayTransportCallbacks {}

impl RelayTransportCallbacks {
    fn context(&self) -> *mut c_void {
        self.context
    }
}

struct CallbackTransport {
    callbacks: RelayTransportCallbacks,
    list_peers: RelayListPeersFn,
    send: RelaySendFn,
}

impl CallbackTransport {
    fn new(callbacks: RelayTransportCallbacks) -> Option<Self> {
        Some(Self {
            list_peers: callbacks.list_peers?,
            send: callbacks.send?,
            callbacks,
        })
    }
}

#[async_trait]
impl Transport for CallbackTransport {
    async fn connected_peers(&self) -> Result<Vec<Peer>, TransportError> {
        let callbacks = self.callbacks;
        let list_peers = self.list_peers;

        let json = tokio::task::spawn_blocking(move || unsafe {
            cstr_to_string(list_peers(callbacks.context()))
        })
        .await
        .map_err(|e| TransportError::Discovery(e.to_string()))?
        .ok_or_else(|| TransportError::Discovery("host returned no peer list".to_string()))?;

        serde_json::from_str(&json).map_err(|e| TransportError::Discovery(e.to_string()))
    }

    async fn send(&self, peer: &Peer, channel: &str, payload: &[u8]) -> Result<(), TransportError> {
        let callbacks = self.callbacks;
        let send = self.send;
        let peer_id = CString::new(peer.id.as_str())
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        let channel = CString::new(channel).map_err(|e| TransportError::Rejected(e.to_string()))?;
        let payload = payload.to_vec();

        let status = tokio::task::spawn_blocking(move || unsafe {
            send(
                callbacks.context(),
                peer_id.as_ptr(),
                channel.as_ptr(),
                payload.as_ptr(),
                payload.len(),
            )
        })
        .await
        .map_err(|e| TransportError::Rejected(e.to_string()))?;

        if status == 0 {
            Ok(())
        } else {
            Err(TransportError::Rejected(format!("host send returned {status}")))
        }
    }
}

/// The host registers the accelerometer itself and reports whether it could.
struct HostMotionSensor {
    available: bool,
}

impl MotionSensor for HostMotionSensor {
    fn is_present(&self) -> bool {
        self.available
    }

    fn register(&self) -> Result<(), String> {
        Ok(())
    }

    fn unregister(&self) {}
}

/// Capability as reported by the host: 1 supported, 0 unsupported, anything
/// else unreadable.
struct HostCapability(i32);

impl CapabilityProbe for HostCapability {
    fn supports_continuous_heart_rate(&self) -> Result<bool, String> {
        match self.0 {
            1 => Ok(true),
            0 => Ok(false),
            code => Err(format!("host reported capability code {code}")),
        }
    }
}

#[derive(Clone, Copy)]
struct ObserverCallback {
    context: *mut c_void,
    callback: RelayObserverFn,
}

// SAFETY: same contract as `RelayTransportCallbacks`.
unsafe impl Send for ObserverCallback {}
unsafe impl Sync for ObserverCallback {}

impl ObserverCallback {
    fn deliver(&self, event: &SessionEvent) {
        let Ok(json) = serde_json::to_string(event) else {
            return;
        };
        if let Ok(json) = CString::new(json) {
            unsafe { (self.callback)(self.context, json.as_ptr()) }
        }
    }
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a relay session
pub struct RelaySessionHandle {
    session: AggregationSession,
    sync: SyncFacade,
    connection: Mutex<HealthServiceConnection>,
    // Declared last so in-flight transmissions are shut down after the session
    runtime: Runtime,
}

fn build_handle(
    config: RelayConfig,
    callbacks: RelayTransportCallbacks,
) -> Result<RelaySessionHandle, RelayError> {
    let transport: Arc<dyn Transport> = Arc::new(CallbackTransport::new(callbacks).ok_or_else(
        || RelayError::InvalidConfig("transport callbacks must not be NULL".to_string()),
    )?);

    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("relay-transmit")
        .enable_time()
        .build()
        .map_err(|e| RelayError::InvalidConfig(format!("failed to start runtime: {e}")))?;

    let session = AggregationSession::new(
        config,
        Arc::clone(&transport),
        Arc::new(SystemClock),
        runtime.handle().clone(),
    )?;

    Ok(RelaySessionHandle {
        session,
        sync: SyncFacade::new(transport),
        connection: Mutex::new(HealthServiceConnection::new()),
        runtime,
    })
}

impl RelaySessionHandle {
    fn connection(&self) -> MutexGuard<'_, HealthServiceConnection> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a new relay session.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string or NULL (defaults).
/// - `callbacks.list_peers` and `callbacks.send` must be non-NULL.
/// - Returns a pointer to a newly allocated session; free with `relay_session_free`.
/// - Returns NULL on error; call `relay_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn relay_session_new(
    config_json: *const c_char,
    callbacks: RelayTransportCallbacks,
) -> *mut RelaySessionHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        RelayConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match RelayConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match build_handle(config, callbacks) {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a relay session. Buffered samples are discarded.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn relay_session_free(session: *mut RelaySessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Start tracking.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - `accelerometer_available` is non-zero when the host registered its
///   accelerometer listener.
/// - Returns the tracking mode (1 = full, 2 = heart rate only) or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn relay_session_start(
    session: *mut RelaySessionHandle,
    accelerometer_available: i32,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let handle = &*session;
    let motion = HostMotionSensor {
        available: accelerometer_available != 0,
    };
    mode_code(handle.session.start(&motion))
}

/// Stop tracking.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - Returns the number of discarded buffered samples, or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn relay_session_stop(session: *mut RelaySessionHandle) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let handle = &*session;
    let motion = HostMotionSensor {
        available: handle.session.mode() == TrackingMode::Full,
    };
    i32::try_from(handle.session.stop(&motion)).unwrap_or(i32::MAX)
}

/// Forward one heart-rate tracker event.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - `ibi_values` and `ibi_statuses` must each point to `ibi_len` integers, or
///   be NULL when `ibi_len` is 0.
/// - Returns 1 if the event validated, 0 if it was rejected or ignored, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn relay_push_heart_rate(
    session: *mut RelaySessionHandle,
    bpm: i32,
    status_code: i32,
    ibi_values: *const i32,
    ibi_statuses: *const i32,
    ibi_len: usize,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    if ibi_len > 0 && (ibi_values.is_null() || ibi_statuses.is_null()) {
        set_last_error("Null IBI array pointer");
        return -1;
    }

    let handle = &*session;
    let (values, statuses) = if ibi_len == 0 {
        (Vec::new(), Vec::new())
    } else {
        (
            slice::from_raw_parts(ibi_values, ibi_len).to_vec(),
            slice::from_raw_parts(ibi_statuses, ibi_len).to_vec(),
        )
    };

    let event = RawHeartRateEvent {
        bpm,
        status_code,
        ibi_values: values,
        ibi_statuses: statuses,
    };
    match handle.session.on_heart_rate_event(&event) {
        Some(_) => 1,
        None => 0,
    }
}

/// Report a heart-rate tracker error to the attached observer.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - `message` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn relay_heart_rate_error(
    session: *mut RelaySessionHandle,
    message: *const c_char,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let message = match cstr_to_string(message) {
        Some(s) => s,
        None => {
            set_last_error("Invalid message string pointer");
            return -1;
        }
    };

    (*session).session.on_heart_rate_tracker_error(&message);
    0
}

/// Forward one accelerometer sample. Never blocks on the network.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - Returns 1 if the sample was buffered, 0 if dropped or ignored, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn relay_push_accel(
    session: *mut RelaySessionHandle,
    x: f32,
    y: f32,
    z: f32,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let admission = (*session).session.on_accel_sample(x, y, z);
    i32::from(admission.accepted)
}

/// Forward an accelerometer accuracy change (informational).
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
#[no_mangle]
pub unsafe extern "C" fn relay_accuracy_changed(session: *mut RelaySessionHandle, accuracy: i32) {
    if !session.is_null() {
        (*session)
            .session
            .on_sensor_accuracy_changed(SensorAccuracy::from_code(accuracy));
    }
}

/// Export the retained heart-rate history to the companion device.
///
/// Blocks until the transport resolves.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - Returns the transmission outcome as JSON; free with `relay_free_string`.
/// - Returns NULL on error; call `relay_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn relay_export_history(session: *mut RelaySessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*session;
    let history = handle.session.history();
    let outcome = handle.runtime.block_on(handle.sync.export_history(&history));
    json_to_cstr(&outcome)
}

/// Relay a pre-serialized heart-rate payload on the single-sample channel.
///
/// Blocks until the transport resolves.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - `payload` must be a valid null-terminated C string.
/// - Returns the transmission outcome as JSON; free with `relay_free_string`.
/// - Returns NULL on error; call `relay_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn relay_send_single(
    session: *mut RelaySessionHandle,
    payload: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let payload = match cstr_to_string(payload) {
        Some(s) => s,
        None => {
            set_last_error("Invalid payload string pointer");
            return ptr::null_mut();
        }
    };

    let handle = &*session;
    let outcome = handle
        .runtime
        .block_on(handle.sync.send_single(payload.as_bytes()));
    json_to_cstr(&outcome)
}

/// Query whether a companion device is connected.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - Returns connectivity JSON; free with `relay_free_string`.
/// - Returns NULL on error; call `relay_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn relay_query_connectivity(session: *mut RelaySessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*session;
    let connectivity = handle.runtime.block_on(handle.sync.query_connectivity());
    json_to_cstr(&connectivity)
}

/// Snapshot session diagnostics.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - Returns diagnostics JSON; free with `relay_free_string`.
/// - Returns NULL on error; call `relay_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn relay_diagnostics(session: *mut RelaySessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    json_to_cstr(&(*session).session.diagnostics())
}

/// Drop all retained heart-rate samples.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn relay_clear_history(session: *mut RelaySessionHandle) {
    if !session.is_null() {
        (*session).session.clear_history();
    }
}

// ============================================================================
// Health Service Connection
// ============================================================================

/// Ask to connect to the health service.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - `capability` is the current continuous heart-rate capability (1 supported,
///   0 unsupported, -1 unreadable); it is only consulted while connected.
/// - Returns 0 if the host must start connecting, 1 if an attempt is in
///   progress, 2 if already connected, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn relay_connection_request(
    session: *mut RelaySessionHandle,
    capability: i32,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    match (*session).connection().request_connect(&HostCapability(capability)) {
        ConnectDecision::StartConnect => 0,
        ConnectDecision::InProgress => 1,
        ConnectDecision::AlreadyConnected => 2,
    }
}

/// Report that the health service connected.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - `capability` as for `relay_connection_request`.
/// - Returns 0 on success, -1 on error (including missing capability); call
///   `relay_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn relay_connection_succeeded(
    session: *mut RelaySessionHandle,
    capability: i32,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    match (*session)
        .connection()
        .connection_succeeded(&HostCapability(capability))
    {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Report that the health service closed the connection.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn relay_connection_ended(session: *mut RelaySessionHandle) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    match (*session).connection().connection_ended() {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Report a health service connection failure.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - `reason` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn relay_connection_failed(
    session: *mut RelaySessionHandle,
    reason: *const c_char,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let reason = match cstr_to_string(reason) {
        Some(s) => s,
        None => {
            set_last_error("Invalid reason string pointer");
            return -1;
        }
    };

    match (*session).connection().connection_failed(reason) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Current health service connection state as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - Returns a newly allocated string; free with `relay_free_string`.
/// - Returns NULL on error; call `relay_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn relay_connection_state(session: *mut RelaySessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let state = (*session).connection().state().clone();
    json_to_cstr(&state)
}

// ============================================================================
// Observer
// ============================================================================

/// Attach an observer, replacing any previous one.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - `callback` runs on sensor and worker threads; `context` must be usable
///   from any thread until `relay_clear_observer` or `relay_session_free`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn relay_set_observer(
    session: *mut RelaySessionHandle,
    context: *mut c_void,
    callback: Option<RelayObserverFn>,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let Some(callback) = callback else {
        set_last_error("Null observer callback");
        return -1;
    };

    let observer = ObserverCallback { context, callback };
    (*session)
        .session
        .attach_observer(Arc::new(move |event: &SessionEvent| observer.deliver(event)));
    0
}

/// Detach the current observer.
///
/// # Safety
/// - `session` must be a valid pointer returned by `relay_session_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn relay_clear_observer(session: *mut RelaySessionHandle) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    (*session).session.detach_observer();
    0
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Relay functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Relay function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn relay_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Relay function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn relay_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Relay library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn relay_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct TestLink {
        peers: CString,
        sent: Mutex<Vec<(String, String, Vec<u8>)>>,
        events: AtomicUsize,
    }

    impl TestLink {
        fn new(peers_json: &str) -> Self {
            Self {
                peers: CString::new(peers_json).unwrap(),
                sent: Mutex::new(Vec::new()),
                events: AtomicUsize::new(0),
            }
        }

        fn callbacks(&self) -> RelayTransportCallbacks {
            RelayTransportCallbacks {
                context: self as *const TestLink as *mut c_void,
                list_peers: Some(test_list_peers),
                send: Some(test_send),
            }
        }
    }

    unsafe extern "C" fn test_list_peers(context: *mut c_void) -> *const c_char {
        (*(context as *const TestLink)).peers.as_ptr()
    }

    unsafe extern "C" fn test_send(
        context: *mut c_void,
        peer_id: *const c_char,
        channel: *const c_char,
        payload: *const u8,
        payload_len: usize,
    ) -> i32 {
        let link = &*(context as *const TestLink);
        link.sent.lock().unwrap().push((
            CStr::from_ptr(peer_id).to_str().unwrap().to_string(),
            CStr::from_ptr(channel).to_str().unwrap().to_string(),
            slice::from_raw_parts(payload, payload_len).to_vec(),
        ));
        0
    }

    unsafe extern "C" fn test_observer(context: *mut c_void, event_json: *const c_char) {
        let link = &*(context as *const TestLink);
        let json = CStr::from_ptr(event_json).to_str().unwrap();
        assert!(json.contains("\"event\""));
        link.events.fetch_add(1, Ordering::SeqCst);
    }

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        relay_free_string(ptr);
        s
    }

    const PHONE: &str = r#"[{"id":"node-1","display_name":"Pixel"}]"#;

    #[test]
    fn test_ffi_session_lifecycle() {
        let link = TestLink::new(PHONE);

        unsafe {
            let session = relay_session_new(ptr::null(), link.callbacks());
            assert!(!session.is_null());

            assert_eq!(relay_session_start(session, 1), 1);
            assert_eq!(relay_push_accel(session, 0.0, 0.0, 9.81), 1);

            let diagnostics = take_string(relay_diagnostics(session));
            assert!(diagnostics.contains("\"buffered_samples\":1"));
            assert!(diagnostics.contains("\"mode\":\"full\""));

            assert_eq!(relay_session_stop(session), 1);
            assert_eq!(relay_push_accel(session, 0.0, 0.0, 9.81), 0);

            relay_session_free(session);
        }
    }

    #[test]
    fn test_ffi_export_history() {
        let link = TestLink::new(PHONE);

        unsafe {
            let session = relay_session_new(ptr::null(), link.callbacks());
            relay_session_start(session, 0);

            let empty = take_string(relay_export_history(session));
            assert!(empty.contains("\"success\":false"));

            let values = [820, 0, 790];
            let statuses = [0, 0, 1];
            assert_eq!(
                relay_push_heart_rate(session, 72, 1, values.as_ptr(), statuses.as_ptr(), 3),
                1
            );
            assert_eq!(
                relay_push_heart_rate(session, 0, 0, ptr::null(), ptr::null(), 0),
                0
            );

            let outcome = take_string(relay_export_history(session));
            assert!(outcome.contains("\"success\":true"));
            assert!(outcome.contains("node-1"));

            let sent = link.sent.lock().unwrap().clone();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].1, "/heart_rate_batch");
            assert_eq!(
                String::from_utf8(sent[0].2.clone()).unwrap(),
                r#"[{"hr":72,"ibi":[820]}]"#
            );

            relay_session_free(session);
        }
    }

    #[test]
    fn test_ffi_connectivity_and_single() {
        let link = TestLink::new("[]");

        unsafe {
            let session = relay_session_new(ptr::null(), link.callbacks());

            let connectivity = take_string(relay_query_connectivity(session));
            assert_eq!(connectivity, r#"{"connected":false,"peer_count":0}"#);

            let payload = CString::new(r#"{"bpm":70}"#).unwrap();
            let outcome = take_string(relay_send_single(session, payload.as_ptr()));
            assert!(outcome.contains("no_peer"));

            relay_session_free(session);
        }
    }

    #[test]
    fn test_ffi_observer() {
        let link = TestLink::new(PHONE);

        unsafe {
            let session = relay_session_new(ptr::null(), link.callbacks());
            let context = &link as *const TestLink as *mut c_void;
            assert_eq!(relay_set_observer(session, context, Some(test_observer)), 0);

            // Missing accelerometer raises one sensor fault
            assert_eq!(relay_session_start(session, 0), 2);
            assert_eq!(link.events.load(Ordering::SeqCst), 1);

            assert_eq!(relay_clear_observer(session), 0);
            relay_push_heart_rate(session, 0, 0, ptr::null(), ptr::null(), 0);
            assert_eq!(link.events.load(Ordering::SeqCst), 1);

            relay_session_free(session);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let bad_config = CString::new(r#"{"buffer_capacity":0}"#).unwrap();
            let link = TestLink::new(PHONE);
            let session = relay_session_new(bad_config.as_ptr(), link.callbacks());
            assert!(session.is_null());

            let error = relay_last_error();
            assert!(!error.is_null());
            assert!(!CStr::from_ptr(error).to_str().unwrap().is_empty());

            let missing = RelayTransportCallbacks {
                context: ptr::null_mut(),
                list_peers: None,
                send: None,
            };
            assert!(relay_session_new(ptr::null(), missing).is_null());

            assert_eq!(relay_session_start(ptr::null_mut(), 1), -1);
            assert!(relay_diagnostics(ptr::null_mut()).is_null());
        }
    }

    #[test]
    fn test_ffi_connection_lifecycle() {
        let link = TestLink::new(PHONE);

        unsafe {
            let session = relay_session_new(ptr::null(), link.callbacks());

            assert_eq!(relay_connection_request(session, 1), 0);
            assert_eq!(relay_connection_request(session, 1), 1);
            assert_eq!(relay_connection_succeeded(session, 1), 0);
            assert_eq!(relay_connection_request(session, 1), 2);
            assert_eq!(
                take_string(relay_connection_state(session)),
                r#"{"state":"connected"}"#
            );

            // Capability lost while connected: reconnect
            assert_eq!(relay_connection_request(session, -1), 0);
            assert_eq!(relay_connection_succeeded(session, 0), -1);
            assert!(take_string(relay_connection_state(session)).contains("not supported"));

            assert_eq!(relay_connection_ended(session), -1);
            assert!(!relay_last_error().is_null());

            relay_session_free(session);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = relay_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
