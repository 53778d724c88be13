// src/sync/flags.rs

//! Installer command-line flags for a sync

use crate::error::{Error, Result};
use crate::repository::InstallOptions;
use std::collections::BTreeSet;

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple";

/// Flags given on the sync command line
///
/// These take precedence over options recorded in the requirements files.
#[derive(Debug, Clone, Default)]
pub struct InstallFlags {
    pub no_index: bool,
    pub index_url: Option<String>,
    pub extra_index_urls: Vec<String>,
    pub trusted_hosts: Vec<String>,
    pub find_links: Vec<String>,
    pub user: bool,
    pub cert: Option<String>,
    pub client_cert: Option<String>,
    /// Extra arguments passed through verbatim after shell splitting
    pub pip_args: Option<String>,
}

/// Compose the flags for the install batch
///
/// Index selection uses the first of: `--no-index` from the command line,
/// `--index-url` from the command line, the indexes recorded in the
/// requirements files, and finally `--no-index`.
pub fn compose_install_flags(file_options: &InstallOptions, flags: &InstallFlags) -> Result<Vec<String>> {
    let mut args = Vec::new();

    if flags.no_index {
        args.push("--no-index".to_string());
    } else if let Some(url) = &flags.index_url {
        args.extend(["--index-url".to_string(), url.clone()]);
    } else {
        let urls = file_index_urls(file_options);
        match urls.split_first() {
            Some((first, rest)) => {
                if first != DEFAULT_INDEX_URL {
                    args.extend(["--index-url".to_string(), first.clone()]);
                }
                for url in rest {
                    args.extend(["--extra-index-url".to_string(), url.clone()]);
                }
            }
            None => args.push("--no-index".to_string()),
        }
    }

    for url in &flags.extra_index_urls {
        args.extend(["--extra-index-url".to_string(), url.clone()]);
    }
    for host in flags.trusted_hosts.iter().chain(&file_options.trusted_hosts) {
        args.extend(["--trusted-host".to_string(), host.clone()]);
    }
    for link in flags.find_links.iter().chain(&file_options.find_links) {
        args.extend(["--find-links".to_string(), link.clone()]);
    }
    push_format_control(&mut args, "--no-binary", &file_options.no_binary);
    push_format_control(&mut args, "--only-binary", &file_options.only_binary);

    if flags.user {
        args.push("--user".to_string());
    }
    if let Some(cert) = &flags.cert {
        args.extend(["--cert".to_string(), cert.clone()]);
    }
    if let Some(client_cert) = &flags.client_cert {
        args.extend(["--client-cert".to_string(), client_cert.clone()]);
    }
    if let Some(pip_args) = &flags.pip_args {
        let split = shlex::split(pip_args)
            .ok_or_else(|| Error::Usage(format!("Cannot parse --pip-args '{}'", pip_args)))?;
        args.extend(split);
    }

    Ok(args)
}

fn file_index_urls(options: &InstallOptions) -> Vec<String> {
    if options.no_index {
        return Vec::new();
    }
    let mut urls = vec![
        options
            .index_url
            .clone()
            .unwrap_or_else(|| DEFAULT_INDEX_URL.to_string()),
    ];
    urls.extend(options.extra_index_urls.iter().cloned());
    urls
}

fn push_format_control(args: &mut Vec<String>, flag: &str, packages: &BTreeSet<String>) {
    if !packages.is_empty() {
        let joined: Vec<&str> = packages.iter().map(String::as_str).collect();
        args.extend([flag.to_string(), joined.join(",")]);
    }
}
