#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

// Commands whose whole remainder is one raw value.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "key",
        action: "set_key",
    },
    CommandSpec {
        command: "prompt",
        action: "set_prompt",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "sticker",
        action: "set_sticker",
    },
    CommandSpec {
        command: "save",
        action: "save",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "regenerate",
        action: "generate",
    },
    CommandSpec {
        command: "remove",
        action: "remove_sticker",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/sticker <path>",
    "/remove",
    "/prompt <text>",
    "/key <api key>",
    "/generate",
    "/regenerate",
    "/save [path]",
    "/status",
    "/help",
    "/quit",
];
