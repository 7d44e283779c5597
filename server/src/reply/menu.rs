//! Canned menu router.

use std::sync::LazyLock;

use regex::Regex;

use super::ReplyRouter;

pub const WELCOME: &str = "Olá! Você está falando com o AURORA do Demetrius Pombo.\n\
Posso ajudar com: menu, agendar, horários, voucher, academy ou atendente.";

pub const MENU: &str = "MENU\n\
1) Agendar horário\n\
2) Horários de funcionamento\n\
3) Voucher (escova/manicure)\n\
4) Academy (cursos & calendário)\n\
5) Falar com um atendente";

pub const AGENDAR: &str = "Perfeito. Envie: serviço + unidade (Centro/Jardim) + dia.\n\
Ex.: \"Escova — Centro — quinta à tarde\". Nossa equipe confirma em seguida.";

pub const HORARIOS: &str =
    "Funcionamos terça a sábado, 9h–19h. Segundas: espaço para cursos/workshops sob solicitação.";

pub const VOUCHER: &str = "Você tem um voucher de cortesia (escova ou manicure).\n\
Para usar: nome completo + unidade + dia. Sujeito à disponibilidade.";

pub const ACADEMY: &str = "Demetrius Pombo Academy: workshops e formações.\n\
Envie \"calendar\" para receber datas e inscrições.";

pub const ATENDENTE: &str = "Encaminhei sua mensagem para nossa equipe. Responderemos em breve.\n\
Se for urgente, escreva \"prioridade\".";

pub const FALLBACK: &str =
    "Entendi parcialmente. Digite \"menu\" ou diga: agendar, voucher, academy ou atendente.";

/// Keyword rules, checked in order. Input is already normalized.
static RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r"\b(ola|oi|bom dia|boa tarde|boa noite|inicio|start)\b",
            WELCOME,
        ),
        (r"\bmenu\b", MENU),
        (r"\b(agendar|marcar|reserva)", AGENDAR),
        (r"\b(hora|horario|funciona|abre|fecha)", HORARIOS),
        (r"\b(voucher|cortesia|presente)", VOUCHER),
        (r"\b(academy|curso|workshop|calendar|calendario)", ACADEMY),
        (r"\b(atendente|humano|suporte)", ATENDENTE),
    ]
    .into_iter()
    .map(|(pattern, reply)| (Regex::new(pattern).expect("valid regex"), reply))
    .collect()
});

/// Keyword router for the salon assistant menu.
///
/// Any non-empty text gets a reply; unmatched text gets the fallback hint.
#[derive(Debug, Clone, Copy, Default)]
pub struct MenuRouter;

impl ReplyRouter for MenuRouter {
    fn route(&self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        if text == "ping" {
            return Some("pong".to_string());
        }

        let reply = RULES
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
            .map_or(FALLBACK, |(_, reply)| reply);

        Some(reply.to_string())
    }
}
