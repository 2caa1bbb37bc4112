use crate::address::GroupAddress;

/// An outbound C-Gate command.
///
/// Commands are addressed inside a project, which is only known to the
/// orchestrator, so rendering takes the project name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CGateCommand {
    TurnOn(GroupAddress),
    TurnOff(GroupAddress),
    Ramp {
        addr: GroupAddress,
        raw: u8,
        time: Option<String>,
    },
    GetLevel(GroupAddress),
    /// Bulk level fetch over a whole application (`N/A`) or network (`N`).
    GetAllLevels {
        netapp: String,
    },
    TreeXml {
        network: String,
    },
    EventOn,
    Login {
        username: String,
        password: String,
    },
}

impl CGateCommand {
    /// Render the newline-terminated wire form of this command.
    pub fn to_line(&self, project: &str) -> String {
        match self {
            CGateCommand::TurnOn(addr) => format!("ON //{project}/{addr}\n"),
            CGateCommand::TurnOff(addr) => format!("OFF //{project}/{addr}\n"),
            CGateCommand::Ramp {
                addr,
                raw,
                time: Some(time),
            } => format!("RAMP //{project}/{addr} {raw} {time}\n"),
            CGateCommand::Ramp {
                addr,
                raw,
                time: None,
            } => format!("RAMP //{project}/{addr} {raw}\n"),
            CGateCommand::GetLevel(addr) => format!("GET //{project}/{addr} level\n"),
            CGateCommand::GetAllLevels { netapp } => format!("GET //{project}/{netapp}/* level\n"),
            CGateCommand::TreeXml { network } => format!("TREEXML {network}\n"),
            CGateCommand::EventOn => "EVENT ON\n".to_string(),
            CGateCommand::Login { username, password } => format!("LOGIN {username} {password}\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(key: &str) -> GroupAddress {
        key.parse().expect("a valid address")
    }

    #[test]
    fn switching_commands_carry_the_project_path() {
        assert_eq!(
            CGateCommand::TurnOn(addr("254/56/10")).to_line("HOME"),
            "ON //HOME/254/56/10\n"
        );
        assert_eq!(
            CGateCommand::TurnOff(addr("254/56/10")).to_line("HOME"),
            "OFF //HOME/254/56/10\n"
        );
    }

    #[test]
    fn ramps_render_with_and_without_a_time() {
        let plain = CGateCommand::Ramp {
            addr: addr("254/56/11"),
            raw: 191,
            time: None,
        };
        assert_eq!(plain.to_line("HOME"), "RAMP //HOME/254/56/11 191\n");

        let timed = CGateCommand::Ramp {
            addr: addr("254/56/11"),
            raw: 191,
            time: Some("4s".to_string()),
        };
        assert_eq!(timed.to_line("HOME"), "RAMP //HOME/254/56/11 191 4s\n");
    }

    #[test]
    fn level_queries_target_one_group_or_a_whole_application() {
        assert_eq!(
            CGateCommand::GetLevel(addr("254/56/14")).to_line("HOME"),
            "GET //HOME/254/56/14 level\n"
        );
        assert_eq!(
            CGateCommand::GetAllLevels {
                netapp: "254/56".to_string()
            }
            .to_line("HOME"),
            "GET //HOME/254/56/* level\n"
        );
    }

    #[test]
    fn session_commands_render_verbatim() {
        assert_eq!(
            CGateCommand::TreeXml {
                network: "254".to_string()
            }
            .to_line("HOME"),
            "TREEXML 254\n"
        );
        assert_eq!(CGateCommand::EventOn.to_line("HOME"), "EVENT ON\n");
        assert_eq!(
            CGateCommand::Login {
                username: "admin".to_string(),
                password: "secret".to_string()
            }
            .to_line("HOME"),
            "LOGIN admin secret\n"
        );
    }
}
