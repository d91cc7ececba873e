use std::sync::Arc;

use crate::conversation::states::{
    Command, ConversationInput, ConversationState, Menu, MenuOption, Next, Reply, Stage,
    Terminal, TransitionOutcome,
};
use crate::dataset::{search, Dataset, DatasetCatalog, DatasetError, DEFAULT_MAX_RESULTS};
use crate::errors::ConversationError;
use crate::format::{ResultFormatter, SearchContext};

pub const GREETING: &str = "Hello! Use the buttons below to look up a subscriber.";
pub const BUILDING_PROMPT: &str = "Please choose a building:";
pub const UNIT_PROMPT: &str = "Now enter the unit number, or part of the subscriber's name:";
pub const CANCELLED: &str = "Operation cancelled. Send /menu to start again.";
pub const IDLE_HINT: &str = "Send /menu to start a new search.";
pub const HELP: &str = "Send /menu to search subscribers by building, block and unit number or \
                        name.\nSend /cancel at any time to stop.";
const INVALID_TEXT: &str =
    "Invalid input. Please enter only a unit number or part of the subscriber's name.";
const INVALID_BUTTON: &str = "Invalid input. Please use the buttons below.";

/// Pure transition function over a dataset snapshot: given where the user is and what they sent,
/// decide the next state and the reply. Holds no per-user data.
#[derive(Clone, Debug)]
pub struct ConversationEngine {
    formatter: ResultFormatter,
    max_results: usize,
}

impl Default for ConversationEngine {
    fn default() -> Self {
        Self::new(ResultFormatter::default(), DEFAULT_MAX_RESULTS)
    }
}

impl ConversationEngine {
    pub fn new(formatter: ResultFormatter, max_results: usize) -> Self {
        Self { formatter, max_results: max_results.max(1) }
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn step(
        &self,
        catalog: &DatasetCatalog,
        current: Option<&ConversationState>,
        input: &ConversationInput,
    ) -> TransitionOutcome {
        let from = current.map(ConversationState::stage);
        let (next, reply, error) = match (current, input) {
            (_, ConversationInput::Command(Command::Start | Command::Menu)) => self.start(catalog),
            (_, ConversationInput::Command(Command::Help)) => {
                (stay(current), Reply::text(HELP), None)
            }
            (Some(_), ConversationInput::Command(Command::Cancel | Command::Unknown(_)))
            | (None, ConversationInput::Command(Command::Cancel)) => {
                (Next::Terminal(Terminal::Cancelled), Reply::text(CANCELLED), None)
            }
            (None, _) => (Next::Idle, Reply::text(IDLE_HINT), None),
            (Some(ConversationState::AwaitingBuilding), ConversationInput::Selection(token)) => {
                self.select_building(catalog, token)
            }
            (
                Some(ConversationState::AwaitingBlock { building }),
                ConversationInput::Selection(token),
            ) => self.select_block(catalog, building, token),
            (
                Some(ConversationState::AwaitingUnitOrName { building, block }),
                ConversationInput::Text(term),
            ) => self.search(catalog, building, block, term),
            (Some(state), _) => self.invalid_input(catalog, state),
        };

        TransitionOutcome { from, next, reply, error }
    }

    fn start(&self, catalog: &DatasetCatalog) -> Step {
        let dataset = match catalog.snapshot() {
            Ok(dataset) => dataset,
            Err(error) => return terminal_error(error.into()),
        };
        if dataset.distinct_buildings().is_empty() {
            return terminal_error(ConversationError::DatasetUnavailable(
                DatasetError::Unavailable("dataset has no buildings".to_owned()),
            ));
        }

        let reply = Reply::text(GREETING)
            .then(Reply::with_menu(BUILDING_PROMPT, building_menu(&dataset)));
        (Next::Continue(ConversationState::AwaitingBuilding), reply, None)
    }

    fn select_building(&self, catalog: &DatasetCatalog, token: &str) -> Step {
        let dataset = match catalog.snapshot() {
            Ok(dataset) => dataset,
            Err(error) => return terminal_error(error.into()),
        };

        if !dataset.distinct_buildings().iter().any(|building| building == token) {
            let error = ConversationError::InvalidSelection {
                stage: Stage::AwaitingBuilding,
                token: token.to_owned(),
            };
            let reply = Reply::with_menu(error.user_message(), building_menu(&dataset));
            return (Next::Continue(ConversationState::AwaitingBuilding), reply, Some(error));
        }

        let blocks = dataset.distinct_blocks(token);
        if blocks.is_empty() {
            let reply = Reply::with_menu(
                format!(
                    "Building {token} selected.\nNo blocks found for this building. \
                     Please choose another building:"
                ),
                building_menu(&dataset),
            );
            return (Next::Continue(ConversationState::AwaitingBuilding), reply, None);
        }

        let reply = Reply::with_menu(
            format!("Building {token} selected.\nPlease choose a block:"),
            block_menu(blocks),
        );
        let next = ConversationState::AwaitingBlock { building: token.to_owned() };
        (Next::Continue(next), reply, None)
    }

    fn select_block(&self, catalog: &DatasetCatalog, building: &str, token: &str) -> Step {
        let dataset = match selections_snapshot(catalog, &[building]) {
            Ok(dataset) => dataset,
            Err(error) => return terminal_error(error),
        };

        let blocks = dataset.distinct_blocks(building);
        if !blocks.iter().any(|block| block == token) {
            let error = ConversationError::InvalidSelection {
                stage: Stage::AwaitingBlock,
                token: token.to_owned(),
            };
            let reply = Reply::with_menu(error.user_message(), block_menu(blocks));
            return (
                Next::Continue(ConversationState::AwaitingBlock { building: building.to_owned() }),
                reply,
                Some(error),
            );
        }

        let reply = Reply::text(format!("Block {token} selected.\n{UNIT_PROMPT}"));
        (
            Next::Continue(ConversationState::AwaitingUnitOrName {
                building: building.to_owned(),
                block: token.to_owned(),
            }),
            reply,
            None,
        )
    }

    fn search(&self, catalog: &DatasetCatalog, building: &str, block: &str, term: &str) -> Step {
        let dataset = match selections_snapshot(catalog, &[building, block]) {
            Ok(dataset) => dataset,
            Err(error) => return terminal_error(error),
        };
        let keep = Next::Continue(ConversationState::AwaitingUnitOrName {
            building: building.to_owned(),
            block: block.to_owned(),
        });

        let term = term.trim();
        if term.is_empty() {
            return (keep, Reply::text(INVALID_TEXT), None);
        }

        let subset = dataset.filter_by_building_and_block(building, block);
        let matches = search(&subset, term, self.max_results);
        if matches.is_empty() {
            let error = ConversationError::NoMatch {
                building: building.to_owned(),
                block: block.to_owned(),
                term: term.to_owned(),
            };
            return (keep, Reply::text(error.user_message()), Some(error));
        }

        let records: Vec<_> = matches.into_iter().cloned().collect();
        let rendered =
            self.formatter.render(&SearchContext { building, block, term }, &records);
        (Next::Terminal(Terminal::Success), Reply::text(rendered), None)
    }

    fn invalid_input(&self, catalog: &DatasetCatalog, state: &ConversationState) -> Step {
        let reply = match state {
            ConversationState::AwaitingUnitOrName { .. } => Reply::text(INVALID_TEXT),
            ConversationState::AwaitingBuilding => match catalog.snapshot() {
                Ok(dataset) => Reply::with_menu(INVALID_BUTTON, building_menu(&dataset)),
                Err(_) => Reply::text(INVALID_BUTTON),
            },
            ConversationState::AwaitingBlock { building } => match catalog.snapshot() {
                Ok(dataset) if !dataset.distinct_blocks(building).is_empty() => {
                    Reply::with_menu(INVALID_BUTTON, block_menu(dataset.distinct_blocks(building)))
                }
                _ => Reply::text(INVALID_BUTTON),
            },
        };
        (Next::Continue(state.clone()), reply, None)
    }
}

type Step = (Next, Reply, Option<ConversationError>);

fn stay(current: Option<&ConversationState>) -> Next {
    match current {
        Some(state) => Next::Continue(state.clone()),
        None => Next::Idle,
    }
}

fn terminal_error(error: ConversationError) -> Step {
    (Next::Terminal(Terminal::Error), Reply::text(error.user_message()), Some(error))
}

/// Snapshot for a stage that depends on earlier selections. Blank selections, or a building that
/// vanished in a reload, mean the stored state no longer describes anything reachable.
fn selections_snapshot(
    catalog: &DatasetCatalog,
    selections: &[&str],
) -> Result<Arc<Dataset>, ConversationError> {
    if selections.iter().any(|value| value.trim().is_empty()) {
        return Err(ConversationError::StateCorruption("blank selection".to_owned()));
    }
    let dataset = catalog.snapshot()?;
    match selections.first() {
        Some(building) if !dataset.has_building(building) => {
            Err(ConversationError::StateCorruption(format!(
                "building `{building}` is no longer in the dataset"
            )))
        }
        _ => Ok(dataset),
    }
}

pub fn building_menu(dataset: &Dataset) -> Menu {
    Menu {
        options: dataset
            .distinct_buildings()
            .iter()
            .map(|building| MenuOption { label: building.clone(), token: building.clone() })
            .collect(),
    }
}

pub fn block_menu(blocks: &[String]) -> Menu {
    Menu {
        options: blocks
            .iter()
            .map(|block| MenuOption { label: format!("Block {block}"), token: block.clone() })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ConversationEngine, CANCELLED, IDLE_HINT};
    use crate::conversation::states::{
        Command, ConversationInput, ConversationState, Next, Stage, Terminal,
    };
    use crate::dataset::{Dataset, DatasetCatalog, Record};
    use crate::errors::ConversationError;

    fn record(building: &str, block: &str, unit: &str, name: &str) -> Record {
        Record {
            building: building.to_owned(),
            block: block.to_owned(),
            unit: unit.to_owned(),
            full_name: name.to_owned(),
            mobile: "9123456789".to_owned(),
            floor: "3".to_owned(),
            amount_due: Some(Decimal::new(500_000, 0)),
            ..Record::default()
        }
    }

    fn catalog() -> DatasetCatalog {
        DatasetCatalog::ready(Dataset::new(vec![
            record("A", "1", "12", "Ali Rezaei"),
            record("A", "1", "14", "Sara Alavi"),
            record("A", "2", "3", "Reza Karimi"),
            record("B", "", "1", "No Block"),
        ]))
    }

    fn text(value: &str) -> ConversationInput {
        ConversationInput::Text(value.to_owned())
    }

    fn select(value: &str) -> ConversationInput {
        ConversationInput::Selection(value.to_owned())
    }

    fn searching(building: &str, block: &str) -> ConversationState {
        ConversationState::AwaitingUnitOrName {
            building: building.to_owned(),
            block: block.to_owned(),
        }
    }

    #[test]
    fn start_offers_buildings() {
        let outcome = ConversationEngine::default().step(
            &catalog(),
            None,
            &ConversationInput::Command(Command::Start),
        );

        assert_eq!(outcome.next, Next::Continue(ConversationState::AwaitingBuilding));
        let menu = outcome.reply.menu().expect("building menu");
        assert_eq!(menu.tokens(), vec!["A", "B"]);
        assert_eq!(outcome.from, None);
    }

    #[test]
    fn start_with_unavailable_dataset_ends_in_error() {
        let outcome = ConversationEngine::default().step(
            &DatasetCatalog::unavailable("file missing"),
            None,
            &ConversationInput::Command(Command::Menu),
        );

        assert_eq!(outcome.next, Next::Terminal(Terminal::Error));
        assert!(matches!(outcome.error, Some(ConversationError::DatasetUnavailable(_))));
    }

    #[test]
    fn menu_mid_search_restarts_at_building_choice() {
        let state = searching("A", "1");
        let outcome = ConversationEngine::default().step(
            &catalog(),
            Some(&state),
            &ConversationInput::Command(Command::Menu),
        );

        assert_eq!(outcome.next, Next::Continue(ConversationState::AwaitingBuilding));
        assert_eq!(outcome.from, Some(Stage::AwaitingUnitOrName));
        assert_eq!(outcome.reply.menu().expect("building menu").tokens(), vec!["A", "B"]);
        assert_eq!(outcome.error, None);
    }

    #[test]
    fn building_selection_offers_block_labels() {
        let outcome = ConversationEngine::default().step(
            &catalog(),
            Some(&ConversationState::AwaitingBuilding),
            &select("A"),
        );

        assert_eq!(
            outcome.next,
            Next::Continue(ConversationState::AwaitingBlock { building: "A".to_owned() })
        );
        let menu = outcome.reply.menu().expect("block menu");
        assert_eq!(menu.tokens(), vec!["1", "2"]);
        assert_eq!(menu.options[0].label, "Block 1");
    }

    #[test]
    fn building_without_blocks_reprompts() {
        let outcome = ConversationEngine::default().step(
            &catalog(),
            Some(&ConversationState::AwaitingBuilding),
            &select("B"),
        );

        assert_eq!(outcome.next, Next::Continue(ConversationState::AwaitingBuilding));
        assert!(outcome.reply.joined_text().contains("No blocks found"));
        assert_eq!(outcome.reply.menu().expect("building menu").tokens(), vec!["A", "B"]);
        assert_eq!(outcome.error, None);
    }

    #[test]
    fn unknown_building_token_is_rejected() {
        let outcome = ConversationEngine::default().step(
            &catalog(),
            Some(&ConversationState::AwaitingBuilding),
            &select("Z"),
        );

        assert_eq!(outcome.next, Next::Continue(ConversationState::AwaitingBuilding));
        assert_eq!(
            outcome.error,
            Some(ConversationError::InvalidSelection {
                stage: Stage::AwaitingBuilding,
                token: "Z".to_owned()
            })
        );
    }

    #[test]
    fn block_must_come_from_the_block_menu() {
        let state = ConversationState::AwaitingBlock { building: "A".to_owned() };
        let outcome = ConversationEngine::default().step(&catalog(), Some(&state), &select("9"));

        assert_eq!(outcome.next, Next::Continue(state));
        assert!(matches!(outcome.error, Some(ConversationError::InvalidSelection { .. })));
    }

    #[test]
    fn unit_search_succeeds_and_terminates() {
        let state = searching("A", "1");
        let outcome = ConversationEngine::default().step(&catalog(), Some(&state), &text(" 12 "));

        assert_eq!(outcome.next, Next::Terminal(Terminal::Success));
        let body = outcome.reply.joined_text();
        assert!(body.contains("Name: Ali Rezaei"));
        assert!(body.contains("Amount: 500,000 Toman"));
        assert!(!body.contains("Sara"));
    }

    #[test]
    fn no_match_keeps_the_stage() {
        let state = searching("A", "1");
        let engine = ConversationEngine::default();
        let first = engine.step(&catalog(), Some(&state), &text("99"));
        let second = engine.step(&catalog(), Some(&state), &text("99"));

        assert_eq!(first.next, Next::Continue(state.clone()));
        assert!(matches!(first.error, Some(ConversationError::NoMatch { .. })));
        assert_eq!(first.reply, second.reply);
    }

    #[test]
    fn results_are_capped() {
        let records = (0..10).map(|n| record("A", "1", &n.to_string(), "Ali")).collect();
        let catalog = DatasetCatalog::ready(Dataset::new(records));
        let state = searching("A", "1");
        let outcome = ConversationEngine::new(Default::default(), 3).step(
            &catalog,
            Some(&state),
            &text("ali"),
        );

        assert_eq!(outcome.reply.joined_text().matches("Name: Ali").count(), 3);
    }

    #[test]
    fn wrong_input_kind_keeps_the_stage() {
        let engine = ConversationEngine::default();
        let on_buttons = engine.step(
            &catalog(),
            Some(&ConversationState::AwaitingBuilding),
            &text("A"),
        );
        assert_eq!(on_buttons.next, Next::Continue(ConversationState::AwaitingBuilding));
        assert!(on_buttons.reply.joined_text().starts_with("Invalid input"));

        let state = searching("A", "1");
        let on_text = engine.step(&catalog(), Some(&state), &select("1"));
        assert_eq!(on_text.next, Next::Continue(state));
    }

    #[test]
    fn cancel_and_unknown_commands_end_the_conversation() {
        let engine = ConversationEngine::default();
        let state = ConversationState::AwaitingBlock { building: "A".to_owned() };

        for command in [Command::Cancel, Command::Unknown("/stats".to_owned())] {
            let outcome =
                engine.step(&catalog(), Some(&state), &ConversationInput::Command(command));
            assert_eq!(outcome.next, Next::Terminal(Terminal::Cancelled));
            assert_eq!(outcome.reply.joined_text(), CANCELLED);
        }
    }

    #[test]
    fn text_without_conversation_hints_at_menu() {
        let outcome = ConversationEngine::default().step(&catalog(), None, &text("12"));

        assert_eq!(outcome.next, Next::Idle);
        assert_eq!(outcome.reply.joined_text(), IDLE_HINT);
    }

    #[test]
    fn vanished_building_is_state_corruption() {
        let catalog = DatasetCatalog::ready(Dataset::new(vec![record("C", "1", "1", "Other")]));
        let state = searching("A", "1");
        let outcome = ConversationEngine::default().step(&catalog, Some(&state), &text("12"));

        assert_eq!(outcome.next, Next::Terminal(Terminal::Error));
        assert!(matches!(outcome.error, Some(ConversationError::StateCorruption(_))));
    }

    #[test]
    fn blank_selection_is_state_corruption() {
        let state = ConversationState::AwaitingBlock { building: "  ".to_owned() };
        let outcome = ConversationEngine::default().step(&catalog(), Some(&state), &select("1"));

        assert_eq!(outcome.next, Next::Terminal(Terminal::Error));
        assert!(matches!(outcome.error, Some(ConversationError::StateCorruption(_))));
    }
}
