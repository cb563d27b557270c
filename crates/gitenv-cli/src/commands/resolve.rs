use super::{
    batch_exit_code, core_err, finish, json_pretty, progress, report_failures, Checkout,
};
use gitenv_core::{compile_patterns, ManifestBuilder};
use gitenv_runtime::{Credentials, PackageBackend};
use gitenv_schema::is_manifest_branch;

pub fn run(
    backend: &dyn PackageBackend,
    uri: &str,
    envs: &[String],
    credentials: Option<Credentials>,
    push: bool,
    json: bool,
) -> Result<u8, String> {
    let patterns = compile_patterns(envs).map_err(|e| core_err(&e))?;
    let checkout = Checkout::clone(uri)?;
    let repo = &checkout.repo;

    let pb = progress(json, "resolving environments...");
    let report = match ManifestBuilder::new(repo, backend)
        .with_credentials(credentials)
        .build_all(&patterns)
    {
        Ok(report) => {
            finish(pb.as_ref(), true, "environments resolved");
            report
        }
        Err(e) => {
            finish(pb.as_ref(), false, "resolve failed");
            return Err(core_err(&e));
        }
    };
    report_failures(&report.failures);

    if push {
        let branches = repo.local_branches().map_err(|e| e.to_string())?;
        for branch in branches.iter().filter(|b| is_manifest_branch(b)) {
            let changed = repo
                .differs_from_upstream(branch)
                .map_err(|e| e.to_string())?;
            if changed {
                if !json {
                    println!("Pushing changes to {branch}");
                }
                repo.push_branch(branch)
                    .map_err(|e| core_err(&e.into()))?;
            }
        }
    }

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        for env in &report.committed {
            println!("updated manifest of {}", super::highlight(env));
        }
    }
    Ok(batch_exit_code(&report.failures))
}
