// secret.rs — Secret subcommands: repository, workflow.

use clap::{Args, Subcommand};
use hooks_secret::{
    derive_repository_secret, derive_workflow_secret, verify_repository_secret,
    verify_workflow_secret, MasterKey, DEFAULT_MASTER_KEY_ENV,
};

#[derive(Args)]
pub struct KeyArgs {
    /// Environment variable holding the master key.
    #[arg(long, default_value = DEFAULT_MASTER_KEY_ENV)]
    key_env: String,
    /// Check this secret instead of printing the derived one.
    #[arg(long)]
    verify: Option<String>,
}

#[derive(Subcommand)]
pub enum SecretCommands {
    /// Secret of a repository-wide webhook.
    Repository {
        project_key: String,
        vcs_name: String,
        repo_name: String,
        /// Hook identifier.
        uuid: String,
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Secret of a webhook targeting one workflow.
    Workflow {
        project_key: String,
        vcs_name: String,
        repo_name: String,
        workflow_name: String,
        /// Hook identifier.
        uuid: String,
        #[command(flatten)]
        key: KeyArgs,
    },
}

pub fn execute(cmd: &SecretCommands) -> anyhow::Result<()> {
    match cmd {
        SecretCommands::Repository {
            project_key,
            vcs_name,
            repo_name,
            uuid,
            key,
        } => {
            let master = MasterKey::from_env(&key.key_env)?;
            match &key.verify {
                Some(presented) => {
                    verify_repository_secret(
                        &master,
                        project_key,
                        vcs_name,
                        repo_name,
                        uuid,
                        presented,
                    )?;
                    println!("Secret matches.");
                }
                None => println!(
                    "{}",
                    derive_repository_secret(&master, project_key, vcs_name, repo_name, uuid)
                ),
            }
        }

        SecretCommands::Workflow {
            project_key,
            vcs_name,
            repo_name,
            workflow_name,
            uuid,
            key,
        } => {
            let master = MasterKey::from_env(&key.key_env)?;
            match &key.verify {
                Some(presented) => {
                    verify_workflow_secret(
                        &master,
                        project_key,
                        vcs_name,
                        repo_name,
                        workflow_name,
                        uuid,
                        presented,
                    )?;
                    println!("Secret matches.");
                }
                None => println!(
                    "{}",
                    derive_workflow_secret(
                        &master,
                        project_key,
                        vcs_name,
                        repo_name,
                        workflow_name,
                        uuid
                    )
                ),
            }
        }
    }
    Ok(())
}
