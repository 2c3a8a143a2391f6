use mind_config::MindConfig;
use mind_core::{Charter, Mind, Result};
use mind_runtime::{CharterUpdate, MindUpdate, NewMind};
use std::sync::Arc;

use super::{CharterArgs, MindAction, preferences, resolve_mind, runner, truncate_output};

pub(super) fn cmd_minds(config: Arc<MindConfig>, action: MindAction) -> Result<()> {
    let service = runner::service(config)?;
    match action {
        MindAction::Create {
            name,
            personality,
            system_prompt,
            prefs,
            charter,
        } => {
            let mind = service.create_mind(NewMind {
                name,
                personality,
                preferences: preferences(prefs),
                system_prompt,
                charter: Some(charter_from_args(charter)),
            })?;
            println!("✅ Created mind '{}' ({})", mind.name, mind.id);
        }
        MindAction::List => {
            let minds = service.list_minds()?;
            if minds.is_empty() {
                println!("No minds yet. Create one with `mind minds create <name>`.");
                return Ok(());
            }
            for mind in &minds {
                println!(
                    "{}  {:<20}  {}",
                    mind.id,
                    mind.name,
                    truncate_output(&mind.charter.mission, 60)
                );
            }
        }
        MindAction::Show { mind, json } => {
            let mind = resolve_mind(&service, &mind)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&mind)?);
            } else {
                print_mind(&mind)?;
            }
        }
        MindAction::Update {
            mind,
            name,
            personality,
            system_prompt,
            prefs,
            charter,
        } => {
            let mind = resolve_mind(&service, &mind)?;
            let update = MindUpdate {
                name,
                personality,
                preferences: (!prefs.is_empty()).then(|| preferences(prefs)),
                system_prompt,
                charter: charter_update_from_args(charter),
            };
            let updated = service.update_mind(&mind.id, update)?;
            println!("✅ Updated mind '{}' ({})", updated.name, updated.id);
        }
    }
    Ok(())
}

/// Charter for a new Mind; unset flags keep the defaults.
fn charter_from_args(args: CharterArgs) -> Charter {
    let mut charter = Charter::default();
    if let Some(mission) = args.mission.filter(|s| !s.trim().is_empty()) {
        charter.mission = mission;
    }
    if let Some(reason) = args.reason.filter(|s| !s.trim().is_empty()) {
        charter.reason_for_existence = reason;
    }
    if !args.principles.is_empty() {
        charter.operating_principles = args.principles;
    }
    if !args.non_goals.is_empty() {
        charter.non_goals = args.non_goals;
    }
    if !args.focus.is_empty() {
        charter.reflection_focus = args.focus;
    }
    charter
}

fn charter_update_from_args(args: CharterArgs) -> Option<CharterUpdate> {
    let non_empty = |items: Vec<String>| (!items.is_empty()).then_some(items);
    let update = CharterUpdate {
        mission: args.mission,
        reason_for_existence: args.reason,
        operating_principles: non_empty(args.principles),
        non_goals: non_empty(args.non_goals),
        reflection_focus: non_empty(args.focus),
    };
    let touched = update.mission.is_some()
        || update.reason_for_existence.is_some()
        || update.operating_principles.is_some()
        || update.non_goals.is_some()
        || update.reflection_focus.is_some();
    touched.then_some(update)
}

fn print_mind(mind: &Mind) -> Result<()> {
    println!("\x1b[1m{}\x1b[0m ({})", mind.name, mind.id);
    println!("  created: {}", mind.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if !mind.personality.is_empty() {
        println!("  personality: {}", mind.personality);
    }
    if !mind.preferences.is_empty() {
        println!("  preferences: {}", serde_json::to_string(&mind.preferences)?);
    }
    if !mind.system_prompt.is_empty() {
        println!("  system prompt: {}", truncate_output(&mind.system_prompt, 120));
    }
    let charter = &mind.charter;
    println!("  mission: {}", charter.mission);
    println!("  reason for existence: {}", charter.reason_for_existence);
    for (label, items) in [
        ("operating principles", &charter.operating_principles),
        ("non-goals", &charter.non_goals),
        ("reflection focus", &charter.reflection_focus),
    ] {
        println!("  {label}:");
        for item in items {
            println!("    - {item}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> CharterArgs {
        CharterArgs {
            mission: None,
            reason: None,
            principles: vec![],
            non_goals: vec![],
            focus: vec![],
        }
    }

    #[test]
    fn test_charter_defaults_survive_missing_flags() {
        let charter = charter_from_args(CharterArgs {
            mission: Some("Ship reports".into()),
            ..args()
        });
        assert_eq!(charter.mission, "Ship reports");
        assert_eq!(charter.non_goals, Charter::default().non_goals);
    }

    #[test]
    fn test_untouched_charter_is_not_an_update() {
        assert!(charter_update_from_args(args()).is_none());
        let update = charter_update_from_args(CharterArgs {
            focus: vec!["speed".into()],
            ..args()
        })
        .unwrap();
        assert_eq!(update.reflection_focus, Some(vec!["speed".to_string()]));
        assert!(update.non_goals.is_none());
    }
}
