//! MongoDB backend for the provisioning [`Server`] contract.

use async_trait::async_trait;
use mongodb::{
    bson::{doc, Document},
    options::{ClientOptions, Credential},
    Client,
};
use serde::Deserialize;

use provision_kernel::settings::DatabaseSettings;
use provision_kernel::{Outcome, Principal, ProvisionError, RoleGrant, Server};

mod classify;
#[cfg(feature = "test-utils")]
pub mod memory;

use classify::{classify, is_already_exists};

const ADMIN_DB: &str = "admin";
const APP_NAME: &str = "provision";

/// A MongoDB deployment reached through a single driver [`Client`].
pub struct MongoServer {
    client: Client,
    options: ClientOptions,
}

#[derive(Debug, Deserialize)]
struct UsersInfo {
    #[serde(default)]
    users: Vec<UserInfo>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    roles: Vec<RoleGrant>,
}

impl MongoServer {
    /// Build a client for `settings.uri`. No network round-trip happens until
    /// the first command; call [`Server::ping`] to verify reachability.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, ProvisionError> {
        let mut options = ClientOptions::parse(&settings.uri)
            .await
            .map_err(|e| classify(e, ADMIN_DB))?;

        let timeout = settings.connect_timeout();
        options.app_name = Some(APP_NAME.to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options.clone()).map_err(|e| classify(e, ADMIN_DB))?;

        tracing::debug!(target: "provision-db", hosts = ?options.hosts, "client configured");
        Ok(Self { client, options })
    }

    async fn admin_command(&self, command: Document) -> Result<Document, mongodb::error::Error> {
        self.client.database(ADMIN_DB).run_command(command).await
    }
}

#[async_trait]
impl Server for MongoServer {
    async fn ping(&self) -> Result<(), ProvisionError> {
        self.admin_command(doc! { "ping": 1 })
            .await
            .map_err(|e| classify(e, ADMIN_DB))?;
        Ok(())
    }

    async fn create_principal(&self, principal: &Principal) -> Result<Outcome, ProvisionError> {
        let roles: Vec<Document> = principal
            .roles
            .iter()
            .map(|grant| doc! { "role": grant.role.as_str(), "db": grant.db.as_str() })
            .collect();

        let command = doc! {
            "createUser": principal.name.as_str(),
            "pwd": principal.secret.expose_secret().as_str(),
            "roles": roles,
        };

        match self
            .client
            .database(&principal.source)
            .run_command(command)
            .await
        {
            Ok(_) => Ok(Outcome::Created),
            Err(e) if is_already_exists(&e) => Ok(Outcome::AlreadyPresent),
            Err(e) => Err(classify(e, &principal.source)),
        }
    }

    async fn principal_roles(
        &self,
        name: &str,
        source: &str,
    ) -> Result<Option<Vec<RoleGrant>>, ProvisionError> {
        let reply = self
            .client
            .database(source)
            .run_command(doc! { "usersInfo": name })
            .await
            .map_err(|e| classify(e, source))?;

        let info: UsersInfo = mongodb::bson::from_document(reply)
            .map_err(|e| ProvisionError::server(format!("unexpected usersInfo reply: {e}")))?;

        Ok(info.users.into_iter().next().map(|user| user.roles))
    }

    async fn authenticate(&mut self, principal: &Principal) -> Result<(), ProvisionError> {
        let mut credential = Credential::default();
        credential.username = Some(principal.name.clone());
        credential.password = Some(principal.secret.expose_secret().clone());
        credential.source = Some(principal.source.clone());

        let mut options = self.options.clone();
        options.credential = Some(credential);

        let client = Client::with_options(options.clone()).map_err(|e| classify(e, ADMIN_DB))?;

        // The handshake authenticates, so the first command surfaces bad credentials.
        client
            .database(ADMIN_DB)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| classify(e, ADMIN_DB))?;

        let previous = std::mem::replace(&mut self.client, client);
        previous.shutdown().await;
        self.options = options;

        tracing::debug!(
            target: "provision-db",
            principal = %principal.name,
            "client re-authenticated"
        );
        Ok(())
    }

    async fn create_collection(
        &self,
        namespace: &str,
        collection: &str,
    ) -> Result<Outcome, ProvisionError> {
        match self
            .client
            .database(namespace)
            .create_collection(collection)
            .await
        {
            Ok(()) => Ok(Outcome::Created),
            Err(e) if is_already_exists(&e) => Ok(Outcome::AlreadyPresent),
            Err(e) => Err(classify(e, namespace)),
        }
    }

    async fn list_collections(&self, namespace: &str) -> Result<Vec<String>, ProvisionError> {
        let mut names = self
            .client
            .database(namespace)
            .list_collection_names()
            .await
            .map_err(|e| classify(e, namespace))?;
        names.sort();
        Ok(names)
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, ProvisionError> {
        let mut names = self
            .client
            .list_database_names()
            .await
            .map_err(|e| classify(e, ADMIN_DB))?;
        names.sort();
        Ok(names)
    }

    async fn disconnect(&mut self) {
        self.client.clone().shutdown().await;
        tracing::debug!(target: "provision-db", "client shut down");
    }
}
