use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Arg, ArgMatches};
use zeroize::Zeroizing;

use crate::destination::{Destination, StagingPath};
use crate::ssh::LogLevel;

const DESC: &str = r#"Example: esxup -r disk.img -h esxi01 -u root -f pwd.txt '[datastore1] /vms/disk.vmdk'
Uploads the disk to a temporary file on the datastore, converts it to a thin
VMDK with vmkfstools, then deletes the temporary file."#;

const DEFAULT_SSH_PORT: u16 = 22;

/// Who verifies the identity of the remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Never check the host key. Open to man-in-the-middle attacks, only
    /// meant for trusted management networks. This is the default.
    Insecure,
    /// Host must be in the user's known_hosts with an unchanged key.
    KnownHosts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    Password,
    // prompts mentioning "password" get the secret, everything else ""
    KeyboardInteractive,
}

#[derive(Clone)]
pub struct ConnectConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub secret: Zeroizing<String>,
    /// Tried in order, skipping those the server does not offer
    pub auth: Vec<AuthStrategy>,
    pub host_key_policy: HostKeyPolicy,
    pub log_level: LogLevel,
}

// Hand written so the secret never ends up in a log line
impl std::fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("auth", &self.auth)
            .field("host_key_policy", &self.host_key_policy)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Config {
    pub local_file: PathBuf,
    pub connect: ConnectConfig,
    pub destination: Destination,
    pub staging: StagingPath,
    pub verbose: bool,
    pub quiet: bool,
    /// `-t` was given. It is accepted for compatibility and ignored.
    pub ignored_file_type: Option<String>,
}

pub fn command() -> clap::Command<'static> {
    clap::Command::new("esxup -r <local> -h <host> -u <user> -f <pwd-file> '[datastore] path'")
        .about(DESC)
        // clap leaves help on --help only, since -h is taken by the host
        .arg(
            Arg::new("local")
                .short('r')
                .takes_value(true)
                .value_name("LOCAL_FILE")
                .required(true)
                .help("Path to the local disk file"),
        )
        .arg(
            Arg::new("host")
                .short('h')
                .takes_value(true)
                .value_name("HOST")
                .required(true)
                .help("IP or hostname of ESXi server"),
        )
        .arg(
            Arg::new("user")
                .short('u')
                .takes_value(true)
                .value_name("USER")
                .required(true)
                .help("ESXi user name"),
        )
        .arg(
            Arg::new("password-file")
                .short('f')
                .takes_value(true)
                .value_name("FILE")
                .required(true)
                .help("File containing ESXi password"),
        )
        .arg(
            Arg::new("tmp-file")
                .long("tmp-file")
                .takes_value(true)
                .value_name("PATH")
                .required(false)
                .help("Temporary file on ESXi before converting (on same DS as final file) [default: /tmp-<millis>.vmdk]"),
        )
        .arg(
            Arg::new("type")
                .short('t')
                .takes_value(true)
                .value_name("N")
                .required(false)
                .help("Not supported: remote file type"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .takes_value(true)
                .value_name("PORT")
                .required(false)
                .help("SSH port [default: 22]"),
        )
        .arg(
            Arg::new("strict-host-key")
                .long("strict-host-key")
                .required(false)
                .help("Verify the host key against known_hosts instead of trusting any key"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .multiple_occurrences(true)
                .required(false)
                .help("Debug level output. Repeat for more libssh detail"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .required(false)
                .help("No upload progress display"),
        )
        .arg(
            Arg::new("destination")
                .required(true)
                .value_name("DESTINATION")
                .help("Datastore path on ESXi, for example '[mydatastore] /builds/blabla.vmdk'"),
        )
}

// Go-flag style `-tmp-file x` is what existing scripts pass.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if arg == "-tmp-file" {
                OsString::from("--tmp-file")
            } else if let Some(value) = arg.to_str().and_then(|s| s.strip_prefix("-tmp-file=")) {
                OsString::from(format!("--tmp-file={value}"))
            } else {
                arg
            }
        })
        .collect()
}

impl Config {
    pub fn from_matches(args: &ArgMatches) -> anyhow::Result<Config> {
        // clap makes sure the required ones are populated
        let required = |name: &str| -> anyhow::Result<String> {
            args.value_of(name)
                .map(str::to_string)
                .with_context(|| format!("missing -{name}"))
        };

        let port = match args.value_of("port") {
            Some(p) => p
                .parse::<u16>()
                .with_context(|| format!("Invalid port '{p}'"))?,
            None => DEFAULT_SSH_PORT,
        };
        let verbose = args.is_present("verbose");
        let secret_file = PathBuf::from(required("password-file")?);
        tracing::info!("Reading password from file \"{}\"", secret_file.display());
        let secret = read_secret(&secret_file)?;

        let destination = Destination::parse(&required("destination")?)?;
        let staging = destination.staging(args.value_of("tmp-file"));

        Ok(Config {
            local_file: PathBuf::from(required("local")?),
            connect: ConnectConfig {
                host: required("host")?,
                port,
                user: required("user")?,
                secret,
                auth: vec![AuthStrategy::Password, AuthStrategy::KeyboardInteractive],
                host_key_policy: if args.is_present("strict-host-key") {
                    HostKeyPolicy::KnownHosts
                } else {
                    HostKeyPolicy::Insecure
                },
                log_level: LogLevel::from_verbosity(args.occurrences_of("verbose")),
            },
            destination,
            staging,
            verbose,
            quiet: args.is_present("quiet"),
            ignored_file_type: args.value_of("type").map(str::to_string),
        })
    }
}

/// Whole file, CR and LF trimmed from both ends.
pub fn read_secret(path: &std::path::Path) -> anyhow::Result<Zeroizing<String>> {
    let raw = Zeroizing::new(
        fs::read(path)
            .with_context(|| format!("Cannot read password from file {}", path.display()))?,
    );
    let text = std::str::from_utf8(&raw)
        .with_context(|| format!("Password file {} is not UTF-8", path.display()))?;
    Ok(Zeroizing::new(
        text.trim_matches(|c| c == '\r' || c == '\n').to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn secret_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f
    }

    fn parse(extra: &[&str]) -> anyhow::Result<Config> {
        let pwd = secret_file(b"hunter2\n");
        let mut argv = vec![
            "esxup",
            "-r",
            "disk.img",
            "-h",
            "esxi01",
            "-u",
            "root",
            "-f",
            pwd.path().to_str().unwrap(),
        ];
        argv.extend_from_slice(extra);
        let matches = command().try_get_matches_from(normalize_args(argv))?;
        Config::from_matches(&matches)
    }

    #[test]
    fn test_read_secret_trims_line_endings() {
        let f = secret_file(b"\r\nhunter2\r\n\n");
        assert_eq!(read_secret(f.path()).unwrap().as_str(), "hunter2");

        // inner and surrounding spaces are part of the password
        let f = secret_file(b" pass word \n");
        assert_eq!(read_secret(f.path()).unwrap().as_str(), " pass word ");
    }

    #[test]
    fn test_read_secret_missing_file() {
        let err = read_secret(std::path::Path::new("/nonexistent/esxup/pwd")).unwrap_err();
        assert!(err.to_string().contains("Cannot read password from file"));
    }

    #[test]
    fn test_normalize_args() {
        let out = normalize_args(["esxup", "-tmp-file", "/x.vmdk", "-tmp-file=/y.vmdk", "-r"]);
        assert_eq!(
            out,
            vec!["esxup", "--tmp-file", "/x.vmdk", "--tmp-file=/y.vmdk", "-r"]
        );
    }

    #[test]
    fn test_config_defaults() {
        let cfg = parse(&["[datastore1]  /vms/disk.vmdk"]).unwrap();
        assert_eq!(cfg.local_file, PathBuf::from("disk.img"));
        assert_eq!(cfg.connect.host, "esxi01");
        assert_eq!(cfg.connect.port, 22);
        assert_eq!(cfg.connect.user, "root");
        assert_eq!(cfg.connect.secret.as_str(), "hunter2");
        assert_eq!(cfg.connect.host_key_policy, HostKeyPolicy::Insecure);
        assert_eq!(
            cfg.connect.auth,
            vec![AuthStrategy::Password, AuthStrategy::KeyboardInteractive]
        );
        assert_eq!(cfg.destination.container, "datastore1");
        assert_eq!(cfg.destination.path, "/vms/disk.vmdk");
        assert!(cfg.staging.relative_path.starts_with("/tmp-"));
        assert!(!cfg.verbose);
        assert_eq!(cfg.connect.log_level, LogLevel::NOLOG);
        assert!(cfg.ignored_file_type.is_none());
    }

    #[test]
    fn test_config_overrides() {
        let cfg = parse(&[
            "-tmp-file",
            "/staging.vmdk",
            "-t",
            "4",
            "--port",
            "2222",
            "--strict-host-key",
            "-v",
            "[ds2] disk.vmdk",
        ])
        .unwrap();
        assert_eq!(cfg.staging.relative_path, "/staging.vmdk");
        assert_eq!(cfg.staging.container, "ds2");
        assert_eq!(cfg.connect.port, 2222);
        assert_eq!(cfg.connect.host_key_policy, HostKeyPolicy::KnownHosts);
        assert!(cfg.verbose);
        assert_eq!(cfg.connect.log_level, LogLevel::PROTOCOL);
        assert_eq!(cfg.ignored_file_type.as_deref(), Some("4"));
    }

    #[test]
    fn test_repeated_verbose_raises_libssh_log_level() {
        let cfg = parse(&["-vv", "[ds] a.vmdk"]).unwrap();
        assert!(cfg.verbose);
        assert_eq!(cfg.connect.log_level, LogLevel::PACKET);

        let cfg = parse(&["-v", "-v", "-v", "-v", "[ds] a.vmdk"]).unwrap();
        assert_eq!(cfg.connect.log_level, LogLevel::FUNCTIONS);
    }

    #[test]
    fn test_config_rejects_bad_input() {
        assert!(parse(&["no brackets here"]).is_err());
        assert!(parse(&["--port", "notaport", "[ds] a.vmdk"]).is_err());
        // destination is required
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let cfg = parse(&["[ds] a.vmdk"]).unwrap();
        assert!(!format!("{:?}", cfg.connect).contains("hunter2"));
    }
}
