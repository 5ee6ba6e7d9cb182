#![allow(non_camel_case_types)]
#![allow(clippy::upper_case_acronyms)]

use std::ffi::{CStr, CString};
use std::fs;
use std::io::Read;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::ptr;
use std::time::Instant;

use anyhow::{anyhow, bail, Context};
use crossbeam_channel::Sender;
use zeroize::Zeroizing;

use crate::config::{AuthStrategy, ConnectConfig, HostKeyPolicy};
use crate::error::DeployError;
use crate::progress_message::Progress;
use crate::remote::{CommandResult, Remote};

// These are in libc crate, but no dependencies is nice
const O_WRONLY: c_int = 1;
const O_CREAT: c_int = 0o100;
const O_TRUNC: c_int = 0o1000;

// Give libssh data in chunks of 128 KiB. I think an sftp packet is 32 KiB.
// Has to be under 256 KiB or things start to break.
const SFTP_CHUNK_SIZE: usize = 128 * 1024;

const SSH_CMD_BUF_SIZE: usize = 4096;

// How long one channel read waits for data before we look at the other stream
const READ_POLL_MS: c_int = 50;

//
// Public API
// Start with: SSH::connect
//

pub struct SSH {
    session: Option<SSHSessionWrap>,
    progress: Option<Sender<Progress>>,
}

impl SSH {
    // libssh version
    pub fn version() -> String {
        unsafe { CStr::from_ptr(ssh_version(0)) }
            .to_string_lossy()
            .into_owned()
    }

    // connect and authenticate
    pub fn connect(config: &ConnectConfig) -> Result<SSH, DeployError> {
        match SSH::open(config) {
            Ok(session) => Ok(SSH {
                session: Some(session),
                progress: None,
            }),
            Err(err) => Err(DeployError::Connect {
                host: config.host.clone(),
                user: config.user.clone(),
                reason: format!("{err:#}"),
            }),
        }
    }

    // Report upload progress on this channel
    pub fn with_progress(mut self, sender: Sender<Progress>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn open(config: &ConnectConfig) -> Result<SSHSessionWrap, anyhow::Error> {
        let host = CString::new(config.host.as_str())?;
        let username = CString::new(config.user.as_str())?;
        let port = c_uint::from(config.port);

        unsafe { ssh_set_log_level(config.log_level as c_int) };
        let session = unsafe { ssh_new() };
        if session.is_null() {
            return Err(anyhow!("ssh_new retuned null"));
        }
        // from here on Drop disconnects and frees it
        let session = SSHSessionWrap(session);
        unsafe {
            ssh_options_set(session.0, SSHOption::HOST, host.as_ptr() as *const c_void);
            ssh_options_set(session.0, SSHOption::PORT, &port as *const _ as _);
            ssh_options_set(session.0, SSHOption::USER, username.as_ptr() as *const c_void);
        }
        tracing::debug!(host = %config.host, port = config.port, "ssh_connect");
        if unsafe { ssh_connect(session.0) } == SSH_ERROR {
            return Err(anyhow!("Connect ERR: {}", session.last_error()));
        }

        match config.host_key_policy {
            HostKeyPolicy::Insecure => {
                tracing::debug!(host = %config.host, "host key not verified");
            }
            HostKeyPolicy::KnownHosts => {
                let is_known = SSHKnownHostsResult::from_raw(unsafe {
                    ssh_session_is_known_server(session.0)
                });
                if !matches!(is_known, SSHKnownHostsResult::HOSTS_OK) {
                    return Err(anyhow!(
                        "Unknown host: {is_known:?}. ssh to it manually first to accept key"
                    ));
                }
            }
        }

        authenticate(&session, config)?;
        Ok(session)
    }

    fn session(&self) -> Result<&SSHSessionWrap, anyhow::Error> {
        self.session
            .as_ref()
            .ok_or_else(|| anyhow!("ssh session is closed"))
    }

    fn send_progress(&self, msg: Progress) {
        if let Some(sender) = &self.progress {
            // display thread gone is not an upload error
            let _ = sender.send(msg);
        }
    }
}

impl Remote for SSH {
    fn run_remote_cmd(&self, cmd: &str) -> Result<CommandResult, anyhow::Error> {
        let session = self.session()?;
        let c_cmd = CString::new(cmd)?;
        let channel = Channel::open(session)?;

        if unsafe { ssh_channel_request_exec(channel.raw, c_cmd.as_ptr()) } == SSH_ERROR {
            bail!("ssh_channel_request_exec: {}", session.last_error());
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut buffer = [0u8; SSH_CMD_BUF_SIZE];
        // stdout and stderr are read in turn so neither can fill the window and stall the other
        while !channel.is_eof() && !channel.is_closed() {
            channel
                .read_timeout(&mut buffer, false, &mut stdout)
                .with_context(|| format!("stdout: {}", session.last_error()))?;
            channel
                .read_timeout(&mut buffer, true, &mut stderr)
                .with_context(|| format!("stderr: {}", session.last_error()))?;
        }
        channel.drain(&mut buffer, false, &mut stdout);
        channel.drain(&mut buffer, true, &mut stderr);

        // waits for exit-status or close, so an exit-signal has arrived by now
        let exit_status = unsafe { ssh_channel_get_exit_status(channel.raw) };
        let signal = channel.exit_signal();
        command_result(exit_status, signal.as_deref(), &stdout, &stderr)
            .map_err(|err| anyhow!("{err}: {}", session.last_error()))
    }

    // Upload a local file to remote
    //
    // src: local path of the file to upload
    // dst: remote full path of destination file to create or overwrite
    fn upload(&self, src: &Path, dst: &str) -> Result<(), anyhow::Error> {
        let session = self.session()?;
        let mut file =
            fs::File::open(src).with_context(|| format!("open local {}", src.display()))?;
        let meta = file.metadata()?;
        let perms = meta.permissions().mode() & 0o777;

        let sftp = SFTP::new(session)?;
        let mut sfile = sftp.open(session, dst, O_WRONLY | O_CREAT | O_TRUNC, perms)?;

        let t_start = Instant::now();
        self.send_progress(Progress::Start(dst.to_string(), meta.len()));
        let mut chunk = vec![0u8; SFTP_CHUNK_SIZE];
        loop {
            let n = file
                .read(&mut chunk)
                .with_context(|| format!("read local {}", src.display()))?;
            if n == 0 {
                break;
            }
            let ret = sfile.write(&chunk[..n]);
            if ret < 0 {
                return Err(sftp.error(session, &format!("upload to {}", dst)));
            }
            let bytes_written = ret as usize;
            if bytes_written != n {
                return Err(anyhow!("Short write: {bytes_written} / {n}"));
            }
            self.send_progress(Progress::Part(n));
        }
        sfile
            .close()
            .map_err(|_| sftp.error(session, &format!("close {}", dst)))?;
        self.send_progress(Progress::Finished(t_start.elapsed()));
        Ok(())
    }

    fn close(&mut self) {
        if self.session.take().is_some() {
            tracing::debug!("ssh session closed");
        }
    }
}

// Which of the secret and "" a keyboard-interactive prompt gets
pub fn answer_for_prompt<'a>(prompt: &str, secret: &'a str) -> &'a str {
    if prompt.to_lowercase().contains("password") {
        secret
    } else {
        ""
    }
}

// A command killed by a signal gets the status a shell would report, 128 + signo.
// Neither a status nor a signal means we don't know how the command ended.
fn command_result(
    exit_status: c_int,
    signal: Option<&str>,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<CommandResult, anyhow::Error> {
    let exit_status = match (exit_status, signal) {
        (status, _) if status >= 0 => status,
        (_, Some(name)) => 128 + signal_number(name).unwrap_or(0),
        (_, None) => bail!("command ended without an exit status"),
    };
    Ok(CommandResult {
        exit_status,
        stdout: String::from_utf8_lossy(stdout).into_owned(),
        stderr: String::from_utf8_lossy(stderr).into_owned(),
    })
}

// RFC 4254 signal names, numbered as on Linux and ESXi
fn signal_number(name: &str) -> Option<c_int> {
    let num = match name.strip_prefix("SIG").unwrap_or(name) {
        "HUP" => 1,
        "INT" => 2,
        "QUIT" => 3,
        "ILL" => 4,
        "ABRT" => 6,
        "FPE" => 8,
        "KILL" => 9,
        "USR1" => 10,
        "SEGV" => 11,
        "USR2" => 12,
        "PIPE" => 13,
        "ALRM" => 14,
        "TERM" => 15,
        _ => return None,
    };
    Some(num)
}

fn authenticate(session: &SSHSessionWrap, config: &ConnectConfig) -> Result<(), anyhow::Error> {
    if config.secret.as_bytes().contains(&0) {
        bail!("password contains a NUL byte");
    }
    let mut secret = Zeroizing::new(config.secret.as_bytes().to_vec());
    secret.push(0);
    let secret_ptr = secret.as_ptr() as *const c_char;

    // "none" can succeed outright, and is what makes the server list its methods
    let ret = SSHAuthResult::from_raw(unsafe { ssh_userauth_none(session.0, ptr::null()) });
    match ret {
        SSHAuthResult::SUCCESS => return Ok(()),
        SSHAuthResult::ERROR => bail!("auth none: {}", session.last_error()),
        _ => {}
    }
    let methods = unsafe { ssh_userauth_list(session.0, ptr::null()) } as c_uint;

    let mut attempts = Vec::with_capacity(config.auth.len());
    for strategy in &config.auth {
        if methods & strategy.method_bit() == 0 {
            tracing::debug!(?strategy, "not offered by server");
            continue;
        }
        let ret = match strategy {
            AuthStrategy::Password => SSHAuthResult::from_raw(unsafe {
                ssh_userauth_password(session.0, ptr::null(), secret_ptr)
            }),
            AuthStrategy::KeyboardInteractive => kbdint(session, &config.secret, secret_ptr),
        };
        tracing::debug!(?strategy, result = ?ret, "auth attempt");
        match ret {
            SSHAuthResult::SUCCESS => return Ok(()),
            SSHAuthResult::ERROR => bail!("auth err: {}", session.last_error()),
            other => attempts.push(format!("{strategy:?}: {other:?}")),
        }
    }
    if attempts.is_empty() {
        bail!("server offers no usable auth method (mask {methods:#x})");
    }
    bail!("auth rejected ({})", attempts.join(", "))
}

fn kbdint(session: &SSHSessionWrap, secret: &str, secret_ptr: *const c_char) -> SSHAuthResult {
    let empty = b"\0".as_ptr() as *const c_char;
    loop {
        let ret = SSHAuthResult::from_raw(unsafe {
            ssh_userauth_kbdint(session.0, ptr::null(), ptr::null())
        });
        if !matches!(ret, SSHAuthResult::INFO) {
            return ret;
        }
        let nprompts = unsafe { ssh_userauth_kbdint_getnprompts(session.0) };
        for i in 0..nprompts.max(0) as c_uint {
            let mut echo: c_char = 0;
            let raw = unsafe { ssh_userauth_kbdint_getprompt(session.0, i, &mut echo) };
            let prompt = if raw.is_null() {
                String::new()
            } else {
                unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned()
            };
            let answer = if answer_for_prompt(&prompt, secret).is_empty() {
                empty
            } else {
                secret_ptr
            };
            if unsafe { ssh_userauth_kbdint_setanswer(session.0, i, answer) } < 0 {
                return SSHAuthResult::ERROR;
            }
        }
    }
}

// Wrap the pointer so we can implement Drop
struct SSHSessionWrap(*mut c_void);

impl SSHSessionWrap {
    fn last_error(&self) -> String {
        unsafe { CStr::from_ptr(ssh_get_error(self.0)) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for SSHSessionWrap {
    fn drop(&mut self) {
        unsafe {
            ssh_disconnect(self.0);
            ssh_free(self.0);
        }
    }
}

// One exec channel. Closed and freed on every path out of run_remote_cmd.
struct Channel {
    raw: SSHChannel,
    // libssh holds pointers to these two until ssh_channel_free
    callbacks: Box<SSHChannelCallbacks>,
    exit_signal: *mut Option<String>,
}

impl Channel {
    fn open(session: &SSHSessionWrap) -> Result<Channel, anyhow::Error> {
        let raw = unsafe { ssh_channel_new(session.0) };
        if raw.is_null() {
            return Err(anyhow!("channel is null: {}", session.last_error()));
        }
        let exit_signal: *mut Option<String> = Box::into_raw(Box::new(None));
        let callbacks = SSHChannelCallbacks::on_exit_signal(exit_signal as *mut c_void);
        let mut channel = Channel {
            raw,
            callbacks: Box::new(callbacks),
            exit_signal,
        };
        let cb: *mut SSHChannelCallbacks = &mut *channel.callbacks;
        if unsafe { ssh_set_channel_callbacks(channel.raw, cb) } == SSH_ERROR {
            return Err(anyhow!(
                "ssh_set_channel_callbacks: {}",
                session.last_error()
            ));
        }
        if unsafe { ssh_channel_open_session(channel.raw) } == SSH_ERROR {
            return Err(anyhow!(
                "ssh_channel_open_session: {}",
                session.last_error()
            ));
        }
        Ok(channel)
    }

    // Name of the signal that killed the remote command, if one did
    fn exit_signal(&self) -> Option<String> {
        unsafe { (*self.exit_signal).clone() }
    }

    fn is_eof(&self) -> bool {
        unsafe { ssh_channel_is_eof(self.raw) != 0 }
    }

    fn is_closed(&self) -> bool {
        unsafe { ssh_channel_is_closed(self.raw) != 0 }
    }

    fn read_timeout(
        &self,
        buffer: &mut [u8],
        is_stderr: bool,
        out: &mut Vec<u8>,
    ) -> Result<usize, anyhow::Error> {
        let nbytes = unsafe {
            ssh_channel_read_timeout(
                self.raw,
                buffer.as_mut_ptr() as *mut c_void,
                buffer.len() as u32,
                c_int::from(is_stderr),
                READ_POLL_MS,
            )
        };
        if nbytes == SSH_ERROR {
            bail!("ssh_channel_read failed");
        }
        // 0 is EOF, SSH_AGAIN is timeout
        if nbytes <= 0 {
            return Ok(0);
        }
        let nbytes = nbytes as usize;
        out.extend_from_slice(&buffer[..nbytes]);
        Ok(nbytes)
    }

    // Whatever libssh still buffers after the remote side closed
    fn drain(&self, buffer: &mut [u8], is_stderr: bool, out: &mut Vec<u8>) {
        loop {
            let nbytes = unsafe {
                ssh_channel_read_nonblocking(
                    self.raw,
                    buffer.as_mut_ptr() as *mut c_void,
                    buffer.len() as u32,
                    c_int::from(is_stderr),
                )
            };
            if nbytes <= 0 {
                return;
            }
            out.extend_from_slice(&buffer[..nbytes as usize]);
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        unsafe {
            if ssh_channel_is_open(self.raw) != 0 {
                ssh_channel_send_eof(self.raw);
                ssh_channel_close(self.raw);
            }
            ssh_channel_free(self.raw);
            drop(Box::from_raw(self.exit_signal));
        }
    }
}

struct SFTP {
    session: SFTPSession,
}

impl SFTP {
    fn new(ssh: &SSHSessionWrap) -> Result<SFTP, anyhow::Error> {
        let session = unsafe { sftp_new(ssh.0) };
        if session.is_null() {
            return Err(anyhow!("sftp_new: {}", ssh.last_error()));
        }
        let sftp = SFTP { session };
        if unsafe { sftp_init(sftp.session) } == SSH_ERROR {
            return Err(anyhow!("SFTP init ERR: {}", ssh.last_error()));
        }
        Ok(sftp)
    }

    fn open(
        &self,
        ssh: &SSHSessionWrap,
        filename: &str,
        mode: c_int,
        perms: u32,
    ) -> Result<SFTPFile, anyhow::Error> {
        let remote_filename = CString::new(filename)?;
        let handle = unsafe { sftp_open(self.session, remote_filename.as_ptr(), mode, perms) };
        if handle.is_null() {
            return Err(self.error(ssh, &format!("sftp_open remote {filename}")));
        }
        Ok(SFTPFile {
            handle: Some(handle),
        })
    }

    fn error(&self, ssh: &SSHSessionWrap, msg: &str) -> anyhow::Error {
        let sftp_err_num = SFTPError::from_raw(unsafe { sftp_get_error(self.session) });
        anyhow!(
            "{}: {}. SFTP err num: {:?}.",
            msg,
            ssh.last_error(),
            sftp_err_num
        )
    }
}

impl Drop for SFTP {
    fn drop(&mut self) {
        unsafe {
            sftp_free(self.session);
        }
    }
}

struct SFTPFile {
    handle: Option<SFTPFileHandle>,
}

impl SFTPFile {
    fn write(&mut self, data: &[u8]) -> isize {
        match self.handle {
            Some(handle) => unsafe { sftp_write(handle, data.as_ptr() as *const c_void, data.len()) },
            None => -1,
        }
    }

    // The remote side only confirms the file once it is closed
    fn close(&mut self) -> Result<(), ()> {
        match self.handle.take() {
            Some(handle) if unsafe { sftp_close(handle) } == SSH_ERROR => Err(()),
            _ => Ok(()),
        }
    }
}

impl Drop for SFTPFile {
    fn drop(&mut self) {
        if self.close().is_err() {
            tracing::warn!("sftp_close err");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LogLevel {
    NOLOG = 0,     // No logging at all
    PROTOCOL = 2,  // High level protocol information
    PACKET = 3,    // Lower level protocol infomations, packet level
    FUNCTIONS = 4, // Every function path
}

impl LogLevel {
    // -v, -vv, -vvv
    pub fn from_verbosity(count: u64) -> LogLevel {
        match count {
            0 => LogLevel::NOLOG,
            1 => LogLevel::PROTOCOL,
            2 => LogLevel::PACKET,
            _ => LogLevel::FUNCTIONS,
        }
    }
}

//
// Internal
//

type SSHSession = *mut c_void;
type SSHChannel = *mut c_void;
type SFTPSession = *mut c_void;
type SFTPFileHandle = *mut c_void;

const SSH_ERROR: c_int = -1;

type ExitSignalCallback = unsafe extern "C" fn(
    session: SSHSession,
    channel: SSHChannel,
    signal: *const c_char,
    core: c_int,
    errmsg: *const c_char,
    lang: *const c_char,
    userdata: *mut c_void,
);

// struct ssh_channel_callbacks_struct from libssh/callbacks.h, as far as
// libssh 0.9 goes. `size` tells libssh where our copy ends.
#[allow(dead_code)]
#[repr(C)]
struct SSHChannelCallbacks {
    size: usize,
    userdata: *mut c_void,
    data: *const c_void,
    eof: *const c_void,
    close: *const c_void,
    signal: *const c_void,
    exit_status: *const c_void,
    exit_signal: Option<ExitSignalCallback>,
    pty_request: *const c_void,
    shell_request: *const c_void,
    auth_agent_req: *const c_void,
    x11_req: *const c_void,
    pty_window_change: *const c_void,
    exec_request: *const c_void,
    env_request: *const c_void,
    subsystem_request: *const c_void,
    write_wontblock: *const c_void,
}

impl SSHChannelCallbacks {
    // Only exit-signal, stored in `slot`, a *mut Option<String>
    fn on_exit_signal(slot: *mut c_void) -> Self {
        SSHChannelCallbacks {
            size: std::mem::size_of::<SSHChannelCallbacks>(),
            userdata: slot,
            data: ptr::null(),
            eof: ptr::null(),
            close: ptr::null(),
            signal: ptr::null(),
            exit_status: ptr::null(),
            exit_signal: Some(store_exit_signal),
            pty_request: ptr::null(),
            shell_request: ptr::null(),
            auth_agent_req: ptr::null(),
            x11_req: ptr::null(),
            pty_window_change: ptr::null(),
            exec_request: ptr::null(),
            env_request: ptr::null(),
            subsystem_request: ptr::null(),
            write_wontblock: ptr::null(),
        }
    }
}

unsafe extern "C" fn store_exit_signal(
    _session: SSHSession,
    _channel: SSHChannel,
    signal: *const c_char,
    _core: c_int,
    _errmsg: *const c_char,
    _lang: *const c_char,
    userdata: *mut c_void,
) {
    if signal.is_null() || userdata.is_null() {
        return;
    }
    let slot = &mut *(userdata as *mut Option<String>);
    *slot = Some(CStr::from_ptr(signal).to_string_lossy().into_owned());
}

// ssh_userauth_list bits
const SSH_AUTH_METHOD_PASSWORD: c_uint = 0x0002;
const SSH_AUTH_METHOD_INTERACTIVE: c_uint = 0x0010;

impl AuthStrategy {
    fn method_bit(&self) -> c_uint {
        match self {
            AuthStrategy::Password => SSH_AUTH_METHOD_PASSWORD,
            AuthStrategy::KeyboardInteractive => SSH_AUTH_METHOD_INTERACTIVE,
        }
    }
}

#[allow(dead_code)]
#[repr(u32)]
enum SSHOption {
    HOST = 0,
    PORT,
    PORT_STR,
    FD,
    USER,
}

#[derive(Debug)]
enum SSHKnownHostsResult {
    // There had been an error checking the host.
    HOSTS_ERROR,

    // The known host file does not exist. The host is thus unknown. File will
    // be created if host key is accepted.
    SSH_KNOWN_HOSTS_NOT_FOUND,

    // The server is unknown. User should confirm the public key hash is correct.
    HOSTS_UNKNOWN,

    // The server is known and has not changed.
    HOSTS_OK,

    // The server key has changed. Either you are under attack or the
    // administrator changed the key. You HAVE to warn the user about a
    // possible attack.
    HOSTS_CHANGED,

    // The server gave use a key of a type while we had an other type recorded.
    // It is a possible attack.
    HOSTS_OTHER,
}

impl SSHKnownHostsResult {
    fn from_raw(ret: c_int) -> Self {
        use SSHKnownHostsResult::*;
        match ret {
            -1 => SSH_KNOWN_HOSTS_NOT_FOUND,
            0 => HOSTS_UNKNOWN,
            1 => HOSTS_OK,
            2 => HOSTS_CHANGED,
            3 => HOSTS_OTHER,
            _ => HOSTS_ERROR,
        }
    }
}

#[derive(Debug, PartialEq)]
enum SFTPError {
    SSH_FX_OK,
    SSH_FX_EOF,
    SSH_FX_NO_SUCH_FILE,
    SSH_FX_PERMISSION_DENIED,
    SSH_FX_FAILURE,
    SSH_FX_BAD_MESSAGE,
    SSH_FX_NO_CONNECTION,
    SSH_FX_CONNECTION_LOST,
    SSH_FX_OP_UNSUPPORTED,
    SSH_FX_INVALID_HANDLE,
    SSH_FX_NO_SUCH_PATH,
    SSH_FX_FILE_ALREADY_EXISTS,
    SSH_FX_WRITE_PROTECT,
    SSH_FX_NO_MEDIA,
    Unknown(c_int),
}

impl SFTPError {
    fn from_raw(code: c_int) -> Self {
        use SFTPError::*;
        match code {
            0 => SSH_FX_OK,
            1 => SSH_FX_EOF,
            2 => SSH_FX_NO_SUCH_FILE,
            3 => SSH_FX_PERMISSION_DENIED,
            4 => SSH_FX_FAILURE,
            5 => SSH_FX_BAD_MESSAGE,
            6 => SSH_FX_NO_CONNECTION,
            7 => SSH_FX_CONNECTION_LOST,
            8 => SSH_FX_OP_UNSUPPORTED,
            9 => SSH_FX_INVALID_HANDLE,
            10 => SSH_FX_NO_SUCH_PATH,
            11 => SSH_FX_FILE_ALREADY_EXISTS,
            12 => SSH_FX_WRITE_PROTECT,
            13 => SSH_FX_NO_MEDIA,
            other => Unknown(other),
        }
    }
}

#[derive(Debug, PartialEq)]
enum SSHAuthResult {
    SUCCESS,
    DENIED,
    PARTIAL,
    INFO,
    AGAIN,
    ERROR,
}

impl SSHAuthResult {
    fn from_raw(ret: c_int) -> Self {
        use SSHAuthResult::*;
        match ret {
            0 => SUCCESS,
            1 => DENIED,
            2 => PARTIAL,
            3 => INFO,
            4 => AGAIN,
            _ => ERROR,
        }
    }
}

//
// FFI
// Wrap libssh. The below is from /usr/include/libssh/libssh.h and sftp.h

#[link(name = "ssh")]
extern "C" {
    fn ssh_version(min: c_int) -> *const c_char;
    fn ssh_set_log_level(level: c_int) -> c_int;
    fn ssh_options_set(s: SSHSession, opt_type: SSHOption, value: *const c_void) -> c_int;

    fn ssh_new() -> SSHSession;
    fn ssh_free(s: SSHSession);

    fn ssh_connect(s: SSHSession) -> c_int;
    fn ssh_disconnect(s: SSHSession);

    fn ssh_get_error(s: SSHSession) -> *const c_char;
    fn ssh_session_is_known_server(s: SSHSession) -> c_int;

    fn ssh_userauth_none(s: SSHSession, username: *const c_char) -> c_int;
    fn ssh_userauth_list(s: SSHSession, username: *const c_char) -> c_int;
    fn ssh_userauth_password(
        s: SSHSession,
        username: *const c_char,
        password: *const c_char,
    ) -> c_int;
    fn ssh_userauth_kbdint(
        s: SSHSession,
        user: *const c_char,
        submethods: *const c_char,
    ) -> c_int;
    fn ssh_userauth_kbdint_getnprompts(s: SSHSession) -> c_int;
    fn ssh_userauth_kbdint_getprompt(s: SSHSession, i: c_uint, echo: *mut c_char)
        -> *const c_char;
    fn ssh_userauth_kbdint_setanswer(s: SSHSession, i: c_uint, answer: *const c_char) -> c_int;

    fn ssh_channel_new(s: SSHSession) -> SSHChannel;
    fn ssh_channel_free(c: SSHChannel);
    fn ssh_channel_open_session(c: SSHChannel) -> c_int;
    fn ssh_channel_request_exec(c: SSHChannel, cmd: *const c_char) -> c_int;
    fn ssh_channel_read_timeout(
        c: SSHChannel,
        dest: *mut c_void,
        count: u32,
        is_stderr: c_int,
        timeout_ms: c_int,
    ) -> c_int;
    fn ssh_channel_read_nonblocking(
        c: SSHChannel,
        dest: *mut c_void,
        count: u32,
        is_stderr: c_int,
    ) -> c_int;
    fn ssh_channel_is_eof(c: SSHChannel) -> c_int;
    fn ssh_channel_is_open(c: SSHChannel) -> c_int;
    fn ssh_channel_is_closed(c: SSHChannel) -> c_int;
    fn ssh_channel_get_exit_status(c: SSHChannel) -> c_int;
    fn ssh_set_channel_callbacks(c: SSHChannel, cb: *mut SSHChannelCallbacks) -> c_int;
    fn ssh_channel_send_eof(c: SSHChannel) -> c_int;
    fn ssh_channel_close(c: SSHChannel) -> c_int;

    fn sftp_new(s: SSHSession) -> SFTPSession;
    fn sftp_free(sftp: SFTPSession);
    fn sftp_init(sftp: SFTPSession) -> c_int;
    fn sftp_get_error(sftp: SFTPSession) -> c_int;

    fn sftp_open(
        sftp: SFTPSession,
        file: *const c_char,
        accesstype: c_int,
        mode: u32,
    ) -> SFTPFileHandle;
    fn sftp_write(sfile: SFTPFileHandle, buf: *const c_void, count: usize) -> isize;
    fn sftp_close(sfile: SFTPFileHandle) -> c_int;
}
