use crate::models::project::Lifecycle;

// Synonym tables carried over from the tracker workspace. Matching is
// substring-based on the lowercased, trimmed label, checked DONE -> BLOCKED
// -> NOT_STARTED with first match winning. Downstream scoring depends on
// that ordering and on the IN_PROGRESS fallback, so the lists are closed:
// new labels get a new table version, not an ad hoc entry.
const DONE_LABELS: &[&str] = &[
    "concluído",
    "concluido",
    "complete",
    "finished",
    "closed",
    "arquivado",
    "finalizado",
    "encerrado",
    "done",
];

const BLOCKED_LABELS: &[&str] = &[
    "travado",
    "impedimento",
    "blocked",
    "hold",
    " congelado",
    "jurídico",
    "financeiro",
    "aguardando cliente",
    "pausado",
];

const NOT_STARTED_LABELS: &[&str] = &[
    "to do",
    "novo",
    "backlog",
    "fila",
    "pendente",
    "not started",
];

/// Map a free-text tracker status onto the closed lifecycle set.
/// Empty input means the tracker gave us nothing useful: assume IN_PROGRESS.
pub fn normalize(raw_status: &str) -> Lifecycle {
    let label = raw_status.trim().to_lowercase();
    if label.is_empty() {
        return Lifecycle::InProgress;
    }

    if DONE_LABELS.iter().any(|needle| label.contains(needle)) {
        return Lifecycle::Done;
    }
    if BLOCKED_LABELS.iter().any(|needle| label.contains(needle)) {
        return Lifecycle::Blocked;
    }
    if NOT_STARTED_LABELS.iter().any(|needle| label.contains(needle)) {
        return Lifecycle::NotStarted;
    }

    Lifecycle::InProgress
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_label_defaults_to_in_progress() {
        assert_eq!(normalize(""), Lifecycle::InProgress);
        assert_eq!(normalize("   "), Lifecycle::InProgress);
    }

    #[test]
    fn done_synonyms_normalize_to_done() {
        assert_eq!(normalize("Concluído"), Lifecycle::Done);
        assert_eq!(normalize("  FINALIZADO  "), Lifecycle::Done);
        assert_eq!(normalize("task closed"), Lifecycle::Done);
    }

    #[test]
    fn blocked_synonyms_normalize_to_blocked() {
        assert_eq!(normalize("Travado - aguardando jurídico"), Lifecycle::Blocked);
        assert_eq!(normalize("On Hold"), Lifecycle::Blocked);
    }

    #[test]
    fn not_started_synonyms_normalize_to_not_started() {
        assert_eq!(normalize("Backlog"), Lifecycle::NotStarted);
        assert_eq!(normalize("to do"), Lifecycle::NotStarted);
    }

    #[test]
    fn done_wins_over_blocked_when_both_match() {
        // "Encerrado - financeiro" matches both tables; DONE is checked first.
        assert_eq!(normalize("Encerrado - financeiro"), Lifecycle::Done);
    }

    #[test]
    fn unrecognized_labels_fall_back_to_in_progress() {
        assert_eq!(normalize("em implantação"), Lifecycle::InProgress);
        assert_eq!(normalize("fase 2"), Lifecycle::InProgress);
    }
}
