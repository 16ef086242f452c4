//! The handler table: 6 dialects × 2 directions × 256 opcodes of function
//! pointers, defaulting to pure forward.
//!
//! Rows mirror which opcodes each dialect actually uses; the patch dialect
//! only knows its handshake and retarget frames. Cells left at the default
//! make the proxy transparent for everything it has no opinion about.

use std::sync::OnceLock;

use revenant_proto::Dialect;

use crate::handlers::{
    handshake, identity, lobby, misc, process_default, retarget, subcommands, transfer, Handler,
};

const DIRECTIONS: usize = 2;
const OPCODES: usize = 256;

type Row = [Handler; OPCODES];

/// Full dispatch table
pub struct HandlerTable {
    cells: [[Row; DIRECTIONS]; 6],
}

impl HandlerTable {
    /// Handler for `(dialect, direction, opcode)`
    #[must_use]
    pub fn lookup(&self, dialect: Dialect, from_server: bool, opcode: u8) -> Handler {
        self.cells[dialect.index()][usize::from(from_server)][usize::from(opcode)]
    }

    fn build() -> Box<Self> {
        let mut table =
            Box::new(Self { cells: [[[process_default as Handler; OPCODES]; DIRECTIONS]; 6] });

        for dialect in [Dialect::Dc, Dialect::Pc, Dialect::Gc, Dialect::Xb] {
            let row = table.server_row(dialect);
            fill_v2_v3_server_row(row);
        }

        // GC and XB carry the V3 extras; GC additionally has the Episode-3
        // and card-list frames and the re-login request
        for dialect in [Dialect::Gc, Dialect::Xb] {
            let row = table.server_row(dialect);
            row[0x1A] = misc::server_1a_d5;
            row[0xD5] = misc::server_1a_d5;
            row[0x81] = identity::server_81;
            row[0xB2] = transfer::server_b2;
            row[0xC4] = identity::server_c4;
            row[0xC9] = subcommands::server_container;
            row[0xCB] = subcommands::server_container;
        }
        {
            let row = table.server_row(Dialect::Gc);
            row[0x9A] = handshake::server_gc_9a;
            row[0xB8] = transfer::server_gc_b8;
            row[0xE4] = identity::server_e4;
        }

        {
            let row = table.server_row(Dialect::Bb);
            row[0x03] = handshake::server_init_bb;
            row[0x13] = transfer::server_13_a7;
            row[0x19] = retarget::server_19_patch_14;
            row[0x22] = handshake::server_bb_preauth;
            row[0x41] = identity::server_41;
            row[0x44] = transfer::server_44_a6;
            for opcode in [0x60, 0x62, 0x6C, 0x6D] {
                row[opcode] = subcommands::server_container;
            }
            row[0x64] = lobby::server_64;
            for opcode in [0x65, 0x67, 0x68] {
                row[opcode] = lobby::server_65_67_68;
            }
            row[0x66] = lobby::server_66_69;
            row[0x69] = lobby::server_66_69;
            row[0x88] = identity::server_88;
            row[0xA6] = transfer::server_44_a6;
            row[0xA7] = transfer::server_13_a7;
            row[0xB2] = transfer::server_b2;
            row[0xE7] = transfer::server_e7;
        }

        {
            let row = table.server_row(Dialect::Patch);
            row[0x02] = handshake::server_init_v2_v3;
            row[0x17] = handshake::server_init_v2_v3;
            row[0x14] = retarget::server_19_patch_14;
        }

        for dialect in [Dialect::Dc, Dialect::Pc, Dialect::Gc, Dialect::Xb, Dialect::Bb] {
            let row = table.client_row(dialect);
            row[0x06] = misc::client_06;
            row[0x40] = identity::client_40;
            for opcode in [0x60, 0x62, 0x6C, 0x6D] {
                row[opcode] = subcommands::client_container;
            }
        }
        for dialect in [Dialect::Dc, Dialect::Pc, Dialect::Gc, Dialect::Xb] {
            let row = table.client_row(dialect);
            row[0xA0] = retarget::client_a0_a1;
            row[0xA1] = retarget::client_a0_a1;
        }
        for dialect in [Dialect::Gc, Dialect::Xb] {
            table.client_row(dialect)[0x81] = identity::client_81;
        }
        table.client_row(Dialect::Bb)[0x93] = handshake::client_bb_93;

        table
    }

    fn server_row(&mut self, dialect: Dialect) -> &mut Row {
        &mut self.cells[dialect.index()][1]
    }

    fn client_row(&mut self, dialect: Dialect) -> &mut Row {
        &mut self.cells[dialect.index()][0]
    }
}

/// Entries shared by every V2/V3 game dialect's server row
fn fill_v2_v3_server_row(row: &mut Row) {
    row[0x02] = handshake::server_init_v2_v3;
    row[0x17] = handshake::server_init_v2_v3;
    row[0x04] = identity::server_04;
    row[0x06] = identity::server_06;
    row[0x13] = transfer::server_13_a7;
    row[0x19] = retarget::server_19_patch_14;
    row[0x41] = identity::server_41;
    row[0x44] = transfer::server_44_a6;
    for opcode in [0x60, 0x62, 0x6C, 0x6D] {
        row[opcode] = subcommands::server_container;
    }
    row[0x64] = lobby::server_64;
    for opcode in [0x65, 0x67, 0x68] {
        row[opcode] = lobby::server_65_67_68;
    }
    row[0x66] = lobby::server_66_69;
    row[0x69] = lobby::server_66_69;
    row[0x88] = identity::server_88;
    row[0x97] = misc::server_97;
    row[0xA6] = transfer::server_44_a6;
    row[0xA7] = transfer::server_13_a7;
}

/// The process-wide table, built on first use
pub fn global() -> &'static HandlerTable {
    static TABLE: OnceLock<Box<HandlerTable>> = OnceLock::new();
    TABLE.get_or_init(HandlerTable::build)
}
