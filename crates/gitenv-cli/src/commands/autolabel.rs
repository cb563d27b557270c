use super::{core_err, json_pretty, Checkout, EXIT_SUCCESS};
use gitenv_core::LabelPromoter;

pub fn run(uri: &str, tag: &str, next_only: bool, push: bool, json: bool) -> Result<u8, String> {
    let checkout = Checkout::clone(uri)?;
    let repo = &checkout.repo;

    let env = LabelPromoter::new(repo)
        .promote(tag, next_only)
        .map_err(|e| core_err(&e))?;

    if push {
        if !json {
            println!("Pushing changes to {env}");
        }
        repo.push_branch(&env).map_err(|e| core_err(&e.into()))?;
    }

    if json {
        let payload = serde_json::json!({
            "env": env,
            "tag": tag,
            "next_only": next_only,
            "pushed": push,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{env}: next -> {tag}");
    }
    Ok(EXIT_SUCCESS)
}
