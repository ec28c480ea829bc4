// classify.rs — Validate event classifications.

use hooks_event::{Classification, EventName, EventType};

pub fn execute(name: Option<&str>, event_type: &str, list: bool) -> anyhow::Result<()> {
    if list {
        for classification in valid_pairs() {
            println!("{}", classification);
        }
        return Ok(());
    }

    let Some(name) = name else {
        anyhow::bail!("an event name is required unless --list is given");
    };
    let classification = Classification::parse(name, event_type)?;
    println!("{}", serde_json::to_string(&classification)?);
    Ok(())
}

fn valid_pairs() -> Vec<Classification> {
    EventName::ALL
        .into_iter()
        .flat_map(|name| {
            EventType::ALL
                .into_iter()
                .filter_map(move |ty| Classification::new(name, ty).ok())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_name_has_at_least_one_valid_pair() {
        let pairs = valid_pairs();
        for name in EventName::ALL {
            assert!(pairs.iter().any(|c| c.name() == name), "{} missing", name);
        }
    }

    #[test]
    fn merged_pull_request_is_not_listed() {
        assert!(!valid_pairs()
            .iter()
            .any(|c| c.to_string() == "pull-request/merged"));
    }

    #[test]
    fn name_is_required_without_list() {
        assert!(execute(None, "", false).is_err());
        assert!(execute(Some("push"), "", false).is_ok());
        assert!(execute(Some("push"), "opened", false).is_err());
    }
}
