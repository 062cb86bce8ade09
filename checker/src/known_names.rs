// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well known callees that are treated in special ways by the call model
/// and the checkers.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialOrd, PartialEq, Hash, Ord)]
pub enum KnownNames {
    /// This is not a known name
    None,
    Abort,
    Alloca,
    Calloc,
    Execl,
    Execv,
    Exit,
    Fgets,
    Free,
    Getenv,
    Gets,
    Malloc,
    Popen,
    Read,
    Realloc,
    Recv,
    Scanf,
    Strcat,
    Strcpy,
    System,
    UnderscoreExit,
}

lazy_static! {
    static ref NAME_TABLE: HashMap<&'static str, KnownNames> = {
        use KnownNames::*;
        let mut table = HashMap::new();
        table.insert("abort", Abort);
        table.insert("alloca", Alloca);
        table.insert("calloc", Calloc);
        table.insert("execl", Execl);
        table.insert("execv", Execv);
        table.insert("exit", Exit);
        table.insert("fgets", Fgets);
        table.insert("free", Free);
        table.insert("getenv", Getenv);
        table.insert("gets", Gets);
        table.insert("malloc", Malloc);
        table.insert("popen", Popen);
        table.insert("read", Read);
        table.insert("realloc", Realloc);
        table.insert("recv", Recv);
        table.insert("scanf", Scanf);
        table.insert("strcat", Strcat);
        table.insert("strcpy", Strcpy);
        table.insert("system", System);
        table.insert("_exit", UnderscoreExit);
        table
    };
}

impl KnownNames {
    pub fn resolve(name: &str) -> KnownNames {
        NAME_TABLE.get(name).copied().unwrap_or(KnownNames::None)
    }

    /// Callees that hand back a fresh heap block.
    pub fn is_heap_allocator(self) -> bool {
        matches!(self, KnownNames::Malloc | KnownNames::Calloc | KnownNames::Realloc)
    }

    /// Callees whose result carries attacker controlled data.
    pub fn is_taint_source(self) -> bool {
        matches!(
            self,
            KnownNames::Getenv
                | KnownNames::Gets
                | KnownNames::Fgets
                | KnownNames::Scanf
                | KnownNames::Read
                | KnownNames::Recv
        )
    }

    /// Callees where tainted arguments are dangerous.
    pub fn is_taint_sink(self) -> bool {
        matches!(
            self,
            KnownNames::System
                | KnownNames::Execl
                | KnownNames::Execv
                | KnownNames::Popen
                | KnownNames::Strcpy
                | KnownNames::Strcat
        )
    }

    /// Callees that never return, independent of declaration attributes.
    pub fn is_no_return(self) -> bool {
        matches!(
            self,
            KnownNames::Exit | KnownNames::Abort | KnownNames::UnderscoreExit
        )
    }
}
