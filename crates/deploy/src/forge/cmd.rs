//! Command builders for `forge create` and `forge verify-contract`.

use alloy_core::{hex, primitives::Address};

use crate::{backend::LinkedLibrary, registry::SourceId};

/// Builder for `forge create` commands.
#[derive(Debug, Clone)]
pub struct ForgeCreateCmdBuilder {
    source: String,
    rpc_url: String,
    private_key: String,
    libraries: Vec<String>,
    constructor_args: Vec<String>,
}

impl ForgeCreateCmdBuilder {
    /// Create a new `forge create` builder for the given contract.
    pub fn new(source: &SourceId) -> Self {
        Self {
            source: source.to_string(),
            rpc_url: String::new(),
            private_key: String::new(),
            libraries: Vec::new(),
            constructor_args: Vec::new(),
        }
    }

    /// Set the RPC URL.
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = url.into();
        self
    }

    /// Set the signer private key.
    pub fn private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = key.into();
        self
    }

    /// Link already deployed libraries.
    pub fn libraries<'a>(mut self, libraries: impl IntoIterator<Item = &'a LinkedLibrary>) -> Self {
        self.libraries
            .extend(libraries.into_iter().map(LinkedLibrary::to_link_arg));
        self
    }

    /// Set the rendered constructor arguments.
    pub fn constructor_args(mut self, args: Vec<String>) -> Self {
        self.constructor_args = args;
        self
    }

    /// Build the command arguments (without the `forge` binary itself).
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "create".to_string(),
            self.source,
            "--rpc-url".to_string(),
            self.rpc_url,
            "--private-key".to_string(),
            self.private_key,
            "--broadcast".to_string(),
        ];

        for library in self.libraries {
            cmd.push("--libraries".to_string());
            cmd.push(library);
        }

        // `--constructor-args` consumes every following value, so it goes last.
        if !self.constructor_args.is_empty() {
            cmd.push("--constructor-args".to_string());
            cmd.extend(self.constructor_args);
        }

        cmd
    }
}

/// Builder for `forge verify-contract` commands.
#[derive(Debug, Clone)]
pub struct ForgeVerifyCmdBuilder {
    address: Address,
    source: String,
    chain_id: u64,
    api_key: String,
    constructor_args: Vec<u8>,
    libraries: Vec<String>,
}

impl ForgeVerifyCmdBuilder {
    /// Create a new `forge verify-contract` builder.
    pub fn new(address: Address, source: &SourceId, chain_id: u64) -> Self {
        Self {
            address,
            source: source.to_string(),
            chain_id,
            api_key: String::new(),
            constructor_args: Vec::new(),
            libraries: Vec::new(),
        }
    }

    /// Set the explorer API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    /// Set the ABI-encoded constructor arguments.
    pub fn constructor_args(mut self, encoded: impl Into<Vec<u8>>) -> Self {
        self.constructor_args = encoded.into();
        self
    }

    /// Libraries the deployed bytecode was linked against.
    pub fn libraries<'a>(mut self, libraries: impl IntoIterator<Item = &'a LinkedLibrary>) -> Self {
        self.libraries
            .extend(libraries.into_iter().map(LinkedLibrary::to_link_arg));
        self
    }

    /// Build the command arguments (without the `forge` binary itself).
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "verify-contract".to_string(),
            self.address.to_checksum(None),
            self.source,
            "--chain".to_string(),
            self.chain_id.to_string(),
            "--etherscan-api-key".to_string(),
            self.api_key,
            // Wait for the explorer's verdict instead of returning on submission.
            "--watch".to_string(),
        ];

        if !self.constructor_args.is_empty() {
            cmd.push("--constructor-args".to_string());
            cmd.push(hex::encode_prefixed(&self.constructor_args));
        }

        for library in self.libraries {
            cmd.push("--libraries".to_string());
            cmd.push(library);
        }

        cmd
    }
}
