use super::{
    batch_exit_code, core_err, finish, highlight, json_pretty, progress, report_failures, Checkout,
};
use gitenv_core::{DeployOptions, Deployer, LockOptions};
use gitenv_runtime::{Credentials, PackageBackend};
use gitenv_store::LinkAction;
use std::path::Path;

pub struct DeployArgs<'a> {
    pub uri: &'a str,
    pub target: &'a Path,
    pub env_labels: &'a [String],
    pub mirror: Option<String>,
    pub credentials: Option<Credentials>,
    pub lock: LockOptions,
}

pub fn run(backend: &dyn PackageBackend, args: DeployArgs<'_>, json: bool) -> Result<u8, String> {
    let mut options = DeployOptions::new(args.env_labels).map_err(|e| core_err(&e))?;
    options.mirror = args.mirror;
    options.credentials = args.credentials;
    options.lock = args.lock;

    let checkout = Checkout::clone(args.uri)?;
    let deployer = Deployer::new(&checkout.repo, backend, args.target, options);

    let pb = progress(json, "deploying environments...");
    let report = match deployer.deploy() {
        Ok(report) => {
            let ok = report.failures.is_empty();
            finish(pb.as_ref(), ok, if ok { "deployed" } else { "deployed with failures" });
            report
        }
        Err(e) => {
            finish(pb.as_ref(), false, "deploy failed");
            return Err(core_err(&e));
        }
    };
    report_failures(&report.failures);

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        for tag in &report.installed {
            println!("installed {}", highlight(tag));
        }
        for event in &report.linked {
            if event.action != LinkAction::Unchanged {
                println!(
                    "Linking {}/{} to {} ({})",
                    event.env, event.label, event.deployed_name, event.tag
                );
            }
        }
    }
    Ok(batch_exit_code(&report.failures))
}
