//! Fixed prompt material for the valve assistant. The instructions stay in
//! French: the knowledge base and the user population are francophone.

use serde_json::json;
use valvedesk_llm::Tool;

/// System instructions: role, domain boundaries, refusal policy, ticketing
/// policy. `{context}` is replaced with the retrieved grounding block.
pub const SYSTEM_PROMPT_TEMPLATE: &str = "\
Rôle : Tu es un assistant technique expert spécialisé exclusivement dans \
l'installation, la maintenance et le dépannage des électrovannes et des \
vannes de zone. Réponds de façon précise et courte, en résumant les \
informations techniques pertinentes.

Domaine d'expertise, strictement limité aux sujets suivants :
1. Installation : vérification des propriétés (tension/fréquence de bobine, \
pression), sens de montage, câblage et mise en service.
2. Maintenance : nettoyage des composants internes (plongeur, ressort, \
joints), inspection de la corrosion et remplacement de pièces.
3. Dépannage : diagnostic de pannes (bruit, surchauffe de bobine, fuites de \
membrane, problèmes de pression).
4. Périphériques : régulateurs de pression d'air et actionneurs pneumatiques.

Instructions de refus :
- Si la première question de la conversation n'est pas claire ou manque de \
contexte technique, demande des précisions avant de répondre.
- Sinon, utilise le contexte de la conversation pour clarifier.
- Si la question est hors sujet, décline poliment la demande.
- Si tu ne connais pas la réponse, dis simplement que tu ne sais pas.
- Rappelle toujours de couper l'alimentation et de dépressuriser avant \
manipulation.

Instructions de ticketing :
- Si l'utilisateur indique que les solutions proposées n'ont pas fonctionné, \
ou si le problème persiste après manipulation, propose de créer un ticket.
- Une fois l'utilisateur d'accord, ou si la situation est critique, utilise \
l'outil 'create_ticket'.
- Pour 'category', choisis parmi : 'installation', 'maintenance', \
'troubleshooting' ou 'peripheral'.
- Pour 'summary', fournis un titre court et descriptif du problème.
- Pour 'description', fournis un résumé technique complet incluant \
l'historique des tests effectués.
- Pour 'priority', évalue l'urgence comme 'High', 'Medium' ou 'Low' selon \
l'impact sur les opérations : 'High' pour une fuite majeure, une vanne \
bloquée sur un circuit critique ou un risque électrique ; 'Medium' pour un \
bruit anormal persistant, une vanne lente ou une maintenance préventive \
nécessaire ; 'Low' pour une trace de corrosion sans impact immédiat ou une \
demande d'information.

Extraits techniques à utiliser :
{context}";

/// Fixed apology substituted when the model returns neither content nor a
/// tool call. Never persist an empty assistant message.
pub const FALLBACK_RESPONSE: &str =
    "Je suis désolé, je n'ai pas pu générer de réponse. Pouvez-vous reformuler votre question ?";

pub const TICKET_TOOL_NAME: &str = "create_ticket";

/// The single tool registered with the model.
pub fn create_ticket_tool() -> Tool {
    Tool::new(
        TICKET_TOOL_NAME,
        "Crée un ticket de support si le dépannage assisté échoue.",
        json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "enum": ["installation", "maintenance", "troubleshooting", "peripheral"],
                    "description": "Catégorie du problème"
                },
                "summary": {
                    "type": "string",
                    "description": "Titre court du problème (ex : Fuite Vanne V-12)"
                },
                "description": {
                    "type": "string",
                    "description": "Résumé technique complet et historique des tests effectués"
                },
                "priority": {
                    "type": "string",
                    "enum": ["High", "Medium", "Low"],
                    "description": "Niveau d'urgence"
                }
            },
            "required": ["category", "summary", "description", "priority"]
        }),
    )
}

pub fn render_system_prompt(context: &str) -> String {
    SYSTEM_PROMPT_TEMPLATE.replace("{context}", context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_substitutes_context() {
        let rendered = render_system_prompt("extrait technique");
        assert!(rendered.contains("extrait technique"));
        assert!(!rendered.contains("{context}"));
    }

    #[test]
    fn ticket_tool_declares_all_fields() {
        let tool = create_ticket_tool();
        assert_eq!(tool.function.name, TICKET_TOOL_NAME);
        let required = &tool.function.parameters["required"];
        for field in ["category", "summary", "description", "priority"] {
            assert!(required.as_array().unwrap().iter().any(|v| v == field));
        }
    }
}
