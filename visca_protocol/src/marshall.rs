//! Command table for Marshall CV620-class cameras.
//!
//! This is protocol-definition data, not logic: one [`Scope`] tree wiring
//! byte fragments from the vendor's VISCA documentation into fully-resolved
//! [`Command`][crate::Command]s. The framing mirrors the protocol itself:
//!
//! * every command is `8x … FF` with `x` the receiver address;
//! * the `command` family adds the `01` domain selector and the
//!   Ack/Completion reply family;
//! * the `inquiry` family adds the `09` selector and the `50` answer marker;
//! * `device setting command`s sit directly inside the root framing.

use crate::{
    packet::{CommandSet, CommandSpec, FamilySpec, PacketKind, ReplySpec, RootSpec, Scope},
    param::{Parameter, ParameterGroup},
    pattern::{Binding, Pattern},
    Result,
};
use std::sync::Arc;

/// Number of command sockets the camera exposes.
pub const N_SOCKETS: usize = 2;

lazy_static! {
    /// The Marshall command table.
    ///
    /// Construction faults in the table are programming errors and abort
    /// on first use.
    pub static ref MARSHALL: Arc<CommandSet> =
        Arc::new(command_set().expect("Marshall command table is well-formed"));
}

const RESOLUTIONS: [(&str, u32); 10] = [
    ("QFHD 4K(3840 x 2160) - 29.97p", 0x05),
    ("QFHD 4K(3840 x 2160) - 25p", 0x06),
    ("FHD 1080P(1920 x 1080) - 59.94p", 0x08),
    ("FHD 1080P(1920 x 1080) - 50p", 0x09),
    ("FHD 1080P(1920 x 1080) - 29.97p", 0x0B),
    ("FHD 1080P(1920 x 1080) - 25p", 0x0C),
    ("HD 720P(1280 x 720) - 59.94p", 0x0E),
    ("HD 720P(1280 x 720) - 50p", 0x0F),
    ("HD 720P(1280 x 720) - 29.97p", 0x11),
    ("HD 720P(1280 x 720) - 25p", 0x12),
];

/// Builds the Marshall command table.
pub fn command_set() -> Result<CommandSet> {
    let receiver_address = ParameterGroup::uint(Parameter::bounded("Address", 1, 7), None);
    let sender_address = ParameterGroup::offset(Parameter::bounded("Address", 1, 7), 8);
    let socket = ParameterGroup::uint(Parameter::bounded("Socket", 1, N_SOCKETS as u32), None);
    let speed = ParameterGroup::uint(Parameter::bounded("Speed", 0, 7), None);
    let zoom_position = ParameterGroup::uint(Parameter::bounded("Zoom Position", 0x0000, 0x4000), Some(4));
    let focus_position = ParameterGroup::uint(Parameter::bounded("Focus Position", 0x000, 0x47A), Some(4));
    let memory_number = ParameterGroup::banked(Parameter::bounded("Memory Number", 0, 255), 128);
    let resolution = ParameterGroup::lookup("Resolution", &RESOLUTIONS, None);
    let vendor_id = ParameterGroup::hex_blob("Vendor ID", 4);
    let model_id = ParameterGroup::hex_blob("Model ID", 4);
    let rom_version = ParameterGroup::hex_blob("Rom Version", 4);
    let max_socket = ParameterGroup::hex_blob("Maximum Socket", 2);

    let mut root = Scope::root(RootSpec {
        prefix: Pattern::compile("8x", &[Binding::new("x", &receiver_address)])?,
        postfix: Pattern::compile("FF", &[])?,
        kind: PacketKind::Command,
        answer_prefix: Pattern::compile("X0", &[Binding::new("X", &sender_address)])?,
        answer_postfix: Pattern::compile("FF", &[])?,
        error_prefix: Pattern::compile("X0", &[Binding::new("X", &sender_address)])?,
        error_postfix: Pattern::compile("FF", &[])?,
        replies: vec![
            ReplySpec::new("Syntax Error", PacketKind::Error, Pattern::compile("60 02", &[])?),
            ReplySpec::new(
                "Command Buffer Full",
                PacketKind::Error,
                Pattern::compile("60 03", &[])?,
            ),
            ReplySpec::new(
                "Command Cancelled",
                PacketKind::Error,
                Pattern::compile("6y 04", &[Binding::new("y", &socket)])?,
            ),
            ReplySpec::new(
                "No Socket",
                PacketKind::Error,
                Pattern::compile("6y 05", &[Binding::new("y", &socket)])?,
            ),
        ],
    });

    {
        let command = root.family(
            "command",
            FamilySpec {
                prefix: Pattern::compile("01", &[])?,
                kind: Some(PacketKind::Command),
                replies: vec![
                    ReplySpec::new(
                        "Ack",
                        PacketKind::Ack,
                        Pattern::compile("4y", &[Binding::new("y", &socket)])?,
                    ),
                    ReplySpec::new(
                        "Completion",
                        PacketKind::Completion,
                        Pattern::compile("5y", &[Binding::new("y", &socket)])?,
                    ),
                    ReplySpec::new(
                        "Command Not Executable",
                        PacketKind::Error,
                        Pattern::compile("6y 41", &[Binding::new("y", &socket)])?,
                    ),
                ],
                ..Default::default()
            },
        );

        {
            let power = command.family(
                "CAM_Power",
                FamilySpec {
                    prefix: Pattern::compile("04 00", &[])?,
                    ..Default::default()
                },
            );
            power.command("On", CommandSpec::core(Pattern::compile("02", &[])?));
            power.command(
                "Off (Standby)",
                CommandSpec::core(Pattern::compile("03", &[])?),
            );
        }

        {
            let zoom = command.family(
                "CAM_Zoom",
                FamilySpec {
                    prefix: Pattern::compile("04", &[])?,
                    ..Default::default()
                },
            );
            zoom.command("Stop", CommandSpec::core(Pattern::compile("07 00", &[])?));
            zoom.command(
                "Tele (Standard)",
                CommandSpec::core(Pattern::compile("07 02", &[])?),
            );
            zoom.command(
                "Wide (Standard)",
                CommandSpec::core(Pattern::compile("07 03", &[])?),
            );
            zoom.command("Tele Step", CommandSpec::core(Pattern::compile("07 04", &[])?));
            zoom.command("Wide Step", CommandSpec::core(Pattern::compile("07 05", &[])?));
            zoom.command(
                "Tele (Variable)",
                CommandSpec::core(Pattern::compile("07 2p", &[Binding::new("p", &speed)])?),
            );
            zoom.command(
                "Wide (Variable)",
                CommandSpec::core(Pattern::compile("07 3p", &[Binding::new("p", &speed)])?),
            );

            let zoom_memory = zoom.family(
                "Zoom Memory Mode",
                FamilySpec {
                    prefix: Pattern::compile("47 00", &[])?,
                    ..Default::default()
                },
            );
            zoom_memory.command("On", CommandSpec::core(Pattern::compile("02", &[])?));
            zoom_memory.command("Off", CommandSpec::core(Pattern::compile("03", &[])?));
        }

        {
            let focus = command.family(
                "CAM_Focus",
                FamilySpec {
                    prefix: Pattern::compile("04", &[])?,
                    ..Default::default()
                },
            );
            // The motion commands are only honoured in manual focus mode.
            focus.command("Stop", CommandSpec::core(Pattern::compile("08 00", &[])?));
            focus.command(
                "Far (Standard)",
                CommandSpec::core(Pattern::compile("08 02", &[])?),
            );
            focus.command(
                "Near (Standard)",
                CommandSpec::core(Pattern::compile("08 03", &[])?),
            );
            focus.command("Far Step", CommandSpec::core(Pattern::compile("08 04", &[])?));
            focus.command("Near Step", CommandSpec::core(Pattern::compile("08 05", &[])?));
            focus.command(
                "Far (Variable)",
                CommandSpec::core(Pattern::compile("08 2p", &[Binding::new("p", &speed)])?),
            );
            focus.command(
                "Near (Variable)",
                CommandSpec::core(Pattern::compile("08 3p", &[Binding::new("p", &speed)])?),
            );
            focus.command("Auto Focus", CommandSpec::core(Pattern::compile("38 02", &[])?));
            focus.command(
                "Manual Focus",
                CommandSpec::core(Pattern::compile("38 03", &[])?),
            );
            focus.command(
                "Auto/Manual Focus",
                CommandSpec::core(Pattern::compile("38 10", &[])?),
            );
            focus.command(
                "One Push Trigger",
                CommandSpec::core(Pattern::compile("18 01", &[])?),
            );
        }

        {
            let curve = command.family(
                "CAM_Curve",
                FamilySpec {
                    prefix: Pattern::compile("04 38 03", &[])?,
                    ..Default::default()
                },
            );
            curve.command(
                "Curve tracking",
                CommandSpec::core(Pattern::compile("02", &[])?),
            );
            curve.command(
                "Zoom tracking",
                CommandSpec::core(Pattern::compile("03", &[])?),
            );
        }

        {
            let sensitivity = command.family(
                "AF Sensitivity",
                FamilySpec {
                    prefix: Pattern::compile("04 58", &[])?,
                    ..Default::default()
                },
            );
            sensitivity.command("High", CommandSpec::core(Pattern::compile("01", &[])?));
            sensitivity.command("Middle", CommandSpec::core(Pattern::compile("02", &[])?));
            sensitivity.command("Low", CommandSpec::core(Pattern::compile("03", &[])?));
        }

        {
            let af_frame = command.family(
                "AF Frame",
                FamilySpec {
                    prefix: Pattern::compile("04 5C", &[])?,
                    ..Default::default()
                },
            );
            af_frame.command("Auto", CommandSpec::core(Pattern::compile("01", &[])?));
            af_frame.command("Full Frame", CommandSpec::core(Pattern::compile("02", &[])?));
            af_frame.command("Center", CommandSpec::core(Pattern::compile("03", &[])?));
            af_frame.command(
                "Auto/Full Frame/Center",
                CommandSpec::core(Pattern::compile("10", &[])?),
            );
        }

        {
            let zoom_focus = command.family("CAM_ZoomFocus", FamilySpec::default());
            zoom_focus.command(
                "Direct",
                CommandSpec::core(Pattern::compile(
                    "04 47 0p 0q 0r 0s 0t 0u 0v 0w 0x",
                    &[
                        Binding::new("pqrs", &zoom_position),
                        Binding::new("tuvw", &focus_position),
                        Binding::new("x", &speed),
                    ],
                )?),
            );
        }

        command.command(
            "Resolution Setting",
            CommandSpec::core(Pattern::compile(
                "06 35 0p 0q",
                &[Binding::new("pq", &resolution)],
            )?),
        );

        {
            let memory = command.family(
                "CAM_Memory",
                FamilySpec {
                    prefix: Pattern::compile("04", &[])?,
                    ..Default::default()
                },
            );
            memory.command(
                "Reset",
                CommandSpec::core(Pattern::compile(
                    "3F g0 pp",
                    &[Binding::new("gpp", &memory_number)],
                )?),
            );
            memory.command(
                "Set",
                CommandSpec::core(Pattern::compile(
                    "3F g1 pp",
                    &[Binding::new("gpp", &memory_number)],
                )?),
            );
            memory.command(
                "Recall",
                CommandSpec::core(Pattern::compile(
                    "3F g2 pp",
                    &[Binding::new("gpp", &memory_number)],
                )?),
            );
        }
    }

    {
        let inquiry = root.family(
            "inquiry",
            FamilySpec {
                prefix: Pattern::compile("09", &[])?,
                kind: Some(PacketKind::Inquiry),
                answer_prefix: Pattern::compile("50", &[])?,
                replies: vec![ReplySpec::new(
                    "Command Not Executable",
                    PacketKind::Error,
                    Pattern::compile("60 41", &[])?,
                )],
                ..Default::default()
            },
        );

        inquiry.command(
            "CAM_PowerInq",
            CommandSpec::core(Pattern::compile("04 00", &[])?).with_replies(vec![
                ReplySpec::new("On", PacketKind::Answer, Pattern::compile("02", &[])?),
                ReplySpec::new(
                    "Off (Standby)",
                    PacketKind::Answer,
                    Pattern::compile("03", &[])?,
                ),
            ]),
        );
        inquiry.command(
            "CAM_SystemStatusInq",
            CommandSpec::core(Pattern::compile("04 00 01", &[])?).with_replies(vec![
                ReplySpec::new("Ready", PacketKind::Answer, Pattern::compile("00", &[])?),
                ReplySpec::new("Processing", PacketKind::Answer, Pattern::compile("01", &[])?),
            ]),
        );
        inquiry.command(
            "CAM_OpticalZoomPosInq",
            CommandSpec::core(Pattern::compile("04 47", &[])?).with_replies(vec![ReplySpec::new(
                "Zoom Position",
                PacketKind::Answer,
                Pattern::compile("0p 0q 0r 0s", &[Binding::new("pqrs", &zoom_position)])?,
            )]),
        );
        inquiry.command(
            "CAM_ZoomMemoryModeInq",
            CommandSpec::core(Pattern::compile("04 47 00", &[])?).with_replies(vec![
                ReplySpec::new("On", PacketKind::Answer, Pattern::compile("02", &[])?),
                ReplySpec::new("Off", PacketKind::Answer, Pattern::compile("03", &[])?),
            ]),
        );
        inquiry.command(
            "CAM_FocusModeInq",
            CommandSpec::core(Pattern::compile("04 38", &[])?).with_replies(vec![
                ReplySpec::new("Auto Focus", PacketKind::Answer, Pattern::compile("02", &[])?),
                ReplySpec::new(
                    "Manual Focus",
                    PacketKind::Answer,
                    Pattern::compile("03", &[])?,
                ),
            ]),
        );
        inquiry.command(
            "CAM_FocusPosInq",
            CommandSpec::core(Pattern::compile("04 48", &[])?).with_replies(vec![ReplySpec::new(
                "Focus Position",
                PacketKind::Answer,
                Pattern::compile("0p 0q 0r 0s", &[Binding::new("pqrs", &focus_position)])?,
            )]),
        );
        inquiry.command(
            "CAM_CurveModeInq",
            CommandSpec::core(Pattern::compile("04 38 03", &[])?).with_replies(vec![
                ReplySpec::new(
                    "Curve tracking",
                    PacketKind::Answer,
                    Pattern::compile("02", &[])?,
                ),
                ReplySpec::new(
                    "Zoom tracking",
                    PacketKind::Answer,
                    Pattern::compile("03", &[])?,
                ),
            ]),
        );
        inquiry.command(
            "AF SensitivityInq",
            CommandSpec::core(Pattern::compile("04 58", &[])?).with_replies(vec![
                ReplySpec::new("High", PacketKind::Answer, Pattern::compile("01", &[])?),
                ReplySpec::new("Middle", PacketKind::Answer, Pattern::compile("02", &[])?),
                ReplySpec::new("Low", PacketKind::Answer, Pattern::compile("03", &[])?),
            ]),
        );
        inquiry.command(
            "AF FrameInq",
            CommandSpec::core(Pattern::compile("04 5C", &[])?).with_replies(vec![
                ReplySpec::new("Auto", PacketKind::Answer, Pattern::compile("01", &[])?),
                ReplySpec::new("Full Frame", PacketKind::Answer, Pattern::compile("02", &[])?),
                ReplySpec::new("Center", PacketKind::Answer, Pattern::compile("03", &[])?),
            ]),
        );
        inquiry.command(
            "Resolution SettingInq",
            CommandSpec::core(Pattern::compile("06 23", &[])?).with_replies(vec![ReplySpec::new(
                "Resolution",
                PacketKind::Answer,
                Pattern::compile("0p 0q", &[Binding::new("pq", &resolution)])?,
            )]),
        );
        inquiry.command(
            "CAM_VersionInq",
            CommandSpec::core(Pattern::compile("00 02", &[])?).with_replies(vec![ReplySpec::new(
                "Version",
                PacketKind::Answer,
                Pattern::compile(
                    "pppp qqqq rrrr ss",
                    &[
                        Binding::new("pppp", &vendor_id),
                        Binding::new("qqqq", &model_id),
                        Binding::new("rrrr", &rom_version),
                        Binding::new("ss", &max_socket),
                    ],
                )?,
            )]),
        );
    }

    {
        let setting = root.family(
            "device setting command",
            FamilySpec {
                kind: Some(PacketKind::DeviceSettingCommand),
                ..Default::default()
            },
        );

        setting.command(
            "CommandCancel",
            CommandSpec::core(Pattern::compile("2p", &[Binding::new("p", &socket)])?),
        );
        setting.command(
            "IF_Clear",
            CommandSpec::core(Pattern::compile("01 00 01", &[])?).with_replies(vec![
                ReplySpec::new("Ack", PacketKind::Answer, Pattern::compile("50", &[])?),
            ]),
        );
        setting.command(
            "IF_Clear (broadcast)",
            CommandSpec::raw(Pattern::compile("88 01 00 01 FF", &[])?).with_replies(vec![
                ReplySpec::raw(
                    "Ack",
                    PacketKind::Answer,
                    Pattern::compile("88 01 00 01 FF", &[])?,
                ),
            ]),
        );
    }

    Ok(root.finish())
}
