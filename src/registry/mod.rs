//! Registry queries issued against a short-lived container session.

mod convert;

pub use convert::{parse_list, parse_single};

use std::fmt;

use serde_json::{Value, json};
use tracing::info;

use crate::config::Config;
use crate::container::{CancelToken, CommandRunner, ContainerManager, LocalRunner};
use crate::error::{Error, Result};

/// Methods of the registry's gRPC service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    ListPackages,
    ListBundles,
    GetPackage,
    GetBundle,
    GetBundleForChannel,
    GetBundleThatReplaces,
    GetDefaultBundleThatProvides,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::ListPackages => "ListPackages",
            Method::ListBundles => "ListBundles",
            Method::GetPackage => "GetPackage",
            Method::GetBundle => "GetBundle",
            Method::GetBundleForChannel => "GetBundleForChannel",
            Method::GetBundleThatReplaces => "GetBundleThatReplaces",
            Method::GetDefaultBundleThatProvides => "GetDefaultBundleThatProvides",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs one registry query per container session.
pub struct Inspector<R: CommandRunner + Clone = LocalRunner> {
    config: Config,
    runner: R,
    cancel: CancelToken,
}

impl Inspector<LocalRunner> {
    pub fn new(config: Config) -> Self {
        Self::with_runner(config, LocalRunner)
    }
}

impl<R: CommandRunner + Clone + Send + Sync + 'static> Inspector<R> {
    pub fn with_runner(config: Config, runner: R) -> Self {
        Self {
            config,
            runner,
            cancel: CancelToken::new(),
        }
    }

    /// Sessions started from now on are torn down when `token` is cancelled.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn list_packages(&self, image: &str) -> Result<Vec<Value>> {
        parse_list(&self.call(image, Method::ListPackages, None)?)
    }

    pub fn list_bundles(&self, image: &str) -> Result<Vec<Value>> {
        parse_list(&self.call(image, Method::ListBundles, None)?)
    }

    pub fn get_package(&self, image: &str, package: &str) -> Result<Value> {
        let payload = json!({ "name": package });
        parse_single(&self.call(image, Method::GetPackage, Some(&payload))?)
    }

    pub fn get_bundle(&self, image: &str, package: &str, channel: &str, csv: &str) -> Result<Value> {
        let payload = json!({ "pkgName": package, "channelName": channel, "csvName": csv });
        parse_single(&self.call(image, Method::GetBundle, Some(&payload))?)
    }

    pub fn get_bundle_for_channel(&self, image: &str, package: &str, channel: &str) -> Result<Value> {
        let payload = json!({ "pkgName": package, "channelName": channel });
        parse_single(&self.call(image, Method::GetBundleForChannel, Some(&payload))?)
    }

    pub fn get_bundle_that_replaces(
        &self,
        image: &str,
        package: &str,
        channel: &str,
        csv: &str,
    ) -> Result<Value> {
        let payload = json!({ "pkgName": package, "channelName": channel, "csvName": csv });
        parse_single(&self.call(image, Method::GetBundleThatReplaces, Some(&payload))?)
    }

    pub fn get_default_bundle_that_provides(
        &self,
        image: &str,
        group: &str,
        version: &str,
        kind: &str,
        plural: &str,
    ) -> Result<Value> {
        let payload = json!({ "group": group, "version": version, "kind": kind, "plural": plural });
        parse_single(&self.call(image, Method::GetDefaultBundleThatProvides, Some(&payload))?)
    }

    /// Shell command calling `method` on the registry at `address`.
    pub fn query_command(&self, address: &str, method: Method, payload: Option<&Value>) -> String {
        let mut command = format!("{} -plaintext", self.config.grpc_client);
        if let Some(payload) = payload {
            command.push_str(" -d ");
            command.push_str(&shell_words::quote(&payload.to_string()));
        }
        format!("{command} {address} {}/{method}", self.config.service)
    }

    fn call(&self, image: &str, method: Method, payload: Option<&Value>) -> Result<String> {
        let mut session =
            ContainerManager::with_runner(image, self.config.clone(), self.runner.clone())
                .with_cancel_token(self.cancel.clone());
        session.start()?;
        let command = self.query_command(&session.local_address()?, method, payload);
        info!(%method, image, "querying registry");
        let reply = session.runner().run(&command);
        session.close();
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        reply
    }
}
