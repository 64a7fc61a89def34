//! CI provider auto-detection. Fills the git/CI metadata fields of the run
//! from well-known environment variables when they are not set explicitly.

use crate::runtime::config::EnvSource;

/// CI system detected from the environment, checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiProvider {
    GithubActions,
    GitlabCi,
    AzurePipelines,
    Bitbucket,
    Local,
}

impl CiProvider {
    pub fn detect(env: &dyn EnvSource) -> Self {
        if is_set(env, "GITHUB_ACTIONS") {
            CiProvider::GithubActions
        } else if is_set(env, "GITLAB_CI") {
            CiProvider::GitlabCi
        } else if is_set(env, "TF_BUILD") {
            CiProvider::AzurePipelines
        } else if is_set(env, "BITBUCKET_BUILD_NUMBER") {
            CiProvider::Bitbucket
        } else {
            CiProvider::Local
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiMetadata {
    pub ci_job_id: String,
    pub git_branch: String,
    pub git_commit_sha: String,
    pub git_commit_msg: String,
    pub git_actor: String,
}

impl CiMetadata {
    pub fn detect(env: &dyn EnvSource) -> (CiProvider, Self) {
        let provider = CiProvider::detect(env);
        (provider, Self::for_provider(provider, env))
    }

    pub fn for_provider(provider: CiProvider, env: &dyn EnvSource) -> Self {
        match provider {
            CiProvider::GithubActions => Self {
                git_branch: first_of(env, &["GITHUB_REF_NAME"]),
                git_commit_sha: first_of(env, &["GITHUB_SHA"]),
                git_commit_msg: first_of(env, &["GITHUB_HEAD_REF"]),
                git_actor: first_of(env, &["GITHUB_ACTOR"]),
                ci_job_id: first_of(env, &["GITHUB_RUN_ID"]),
            },
            CiProvider::GitlabCi => Self {
                git_branch: first_of(env, &["CI_COMMIT_BRANCH"]),
                git_commit_sha: first_of(env, &["CI_COMMIT_SHA"]),
                git_commit_msg: first_of(env, &["CI_COMMIT_MESSAGE"]),
                git_actor: first_of(env, &["GITLAB_USER_LOGIN", "GITLAB_USER_NAME"]),
                ci_job_id: first_of(env, &["CI_JOB_ID"]),
            },
            CiProvider::AzurePipelines => Self {
                git_branch: first_of(env, &["BUILD_SOURCEBRANCHNAME"]),
                git_commit_sha: first_of(env, &["BUILD_SOURCEVERSION"]),
                git_commit_msg: String::new(),
                git_actor: first_of(env, &["BUILD_REQUESTEDFORID", "BUILD_REQUESTEDFOR"]),
                ci_job_id: first_of(env, &["BUILD_BUILDID"]),
            },
            CiProvider::Bitbucket => Self {
                git_branch: first_of(env, &["BITBUCKET_BRANCH"]),
                git_commit_sha: first_of(env, &["BITBUCKET_COMMIT"]),
                git_commit_msg: String::new(),
                git_actor: first_of(env, &["BITBUCKET_STEP_TRIGGERER_UUID"]),
                ci_job_id: first_of(env, &["BITBUCKET_BUILD_NUMBER"]),
            },
            CiProvider::Local => Self {
                git_branch: first_of(env, &["GIT_BRANCH"]),
                git_commit_sha: first_of(env, &["GIT_COMMIT_SHA"]),
                git_commit_msg: first_of(env, &["GIT_COMMIT_MSG"]),
                git_actor: first_of(env, &["GIT_ACTOR", "USER", "USERNAME"]),
                ci_job_id: first_of(env, &["CI_JOB_ID"]),
            },
        }
    }
}

fn is_set(env: &dyn EnvSource, name: &str) -> bool {
    env.var(name).is_some_and(|value| !value.is_empty())
}

/// First non-empty value among `names`, or an empty string.
fn first_of(env: &dyn EnvSource, names: &[&str]) -> String {
    names
        .iter()
        .filter_map(|name| env.var(name))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}
