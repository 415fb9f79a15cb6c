use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::types::{ProgramId, Requiredness, Tree, TypeId, TypeKind};

/// Length of the hex fingerprint: 16 digest bytes, MD5-class.
const FINGERPRINT_BYTES: usize = 16;

fn req_tag(req: Requiredness) -> &'static str {
    match req {
        Requiredness::Required    => "req",
        Requiredness::Optional    => "opt",
        Requiredness::OptInReqOut => "def",
    }
}

/// Computes canonical structural fingerprints. Struct references inside a
/// signature are the referenced type's own fingerprint, computed on demand
/// and memoized; a type re-entered while its own signature is still being
/// assembled becomes a back-reference sentinel keyed by relative recursion
/// depth, so self-referential shapes terminate and stay stable.
pub struct Fingerprinter<'a> {
    tree:        &'a Tree,
    cache:       HashMap<TypeId, String>,
    in_progress: HashMap<TypeId, usize>,
}

impl<'a> Fingerprinter<'a> {
    pub fn new(tree: &'a Tree) -> Self {
        // Previously stamped fingerprints seed the memo table so repeated
        // passes over shared includes agree without recomputation.
        let mut cache = HashMap::new();
        for (i, ty) in tree.types.iter().enumerate() {
            if let Some(fp) = &ty.fingerprint {
                cache.insert(TypeId(i), fp.clone());
            }
        }
        Fingerprinter {
            tree,
            cache,
            in_progress: HashMap::new(),
        }
    }

    pub fn fingerprint(&mut self, id: TypeId) -> String {
        self.struct_fingerprint(id, 0)
    }

    fn struct_fingerprint(&mut self, id: TypeId, depth: usize) -> String {
        if let Some(fp) = self.cache.get(&id) {
            return fp.clone();
        }
        self.in_progress.insert(id, depth);
        let sig = self.struct_signature(id, depth);
        self.in_progress.remove(&id);

        let digest = Sha256::digest(sig.as_bytes());
        let fp = hex::encode(&digest[..FINGERPRINT_BYTES]);
        self.cache.insert(id, fp.clone());
        fp
    }

    /// The stable textual signature of a struct's shape: members in field-tag
    /// order, each contributing tag, requiredness, type signature, and field
    /// name. The struct's own name contributes nothing.
    fn struct_signature(&mut self, id: TypeId, depth: usize) -> String {
        let tree: &'a Tree = self.tree;
        let mut fields: Vec<_> = tree.ty(id).fields().unwrap_or(&[]).iter().collect();
        fields.sort_by_key(|f| f.key);

        let mut parts = Vec::with_capacity(fields.len());
        for field in fields {
            parts.push(format!(
                "{}:{}:{}:{}",
                field.key,
                req_tag(field.req),
                self.type_sig(field.ty, depth + 1),
                field.name
            ));
        }
        format!("{{{}}}", parts.join(","))
    }

    fn type_sig(&mut self, id: TypeId, depth: usize) -> String {
        let tree: &'a Tree = self.tree;
        let tid = tree.true_type(id);
        match &tree.ty(tid).kind {
            TypeKind::Base(base) => base.keyword().to_string(),
            TypeKind::Enum { .. } => "enum".to_string(),
            TypeKind::List { elem } => format!("list<{}>", self.type_sig(*elem, depth)),
            TypeKind::Set { elem } => format!("set<{}>", self.type_sig(*elem, depth)),
            TypeKind::Map { key, value } => format!(
                "map<{},{}>",
                self.type_sig(*key, depth),
                self.type_sig(*value, depth)
            ),
            TypeKind::Struct { .. } | TypeKind::Exception { .. } => {
                if let Some(fp) = self.cache.get(&tid) {
                    return fp.clone();
                }
                if let Some(&entered) = self.in_progress.get(&tid) {
                    return format!("rec@{}", depth - entered);
                }
                self.struct_fingerprint(tid, depth)
            }
            TypeKind::Service { .. } => "service".to_string(),
            TypeKind::Typedef { .. } | TypeKind::Unresolved => "unresolved".to_string(),
        }
    }
}

/// Stamps a fingerprint onto every struct and exception of a program, in
/// declaration order.
pub fn fingerprint_program(tree: &mut Tree, pid: ProgramId) {
    let program = tree.program(pid);
    let ids: Vec<TypeId> = program
        .structs
        .iter()
        .chain(program.exceptions.iter())
        .copied()
        .collect();

    let mut computed = Vec::with_capacity(ids.len());
    {
        let mut fpr = Fingerprinter::new(tree);
        for id in &ids {
            computed.push((*id, fpr.fingerprint(*id)));
        }
    }
    for (id, fp) in computed {
        tree.ty_mut(id).fingerprint = Some(fp);
    }
}
