//! The standard handlers installed by [`Router::default`].
//!
//! Each handler decodes its message, checks that the session is in a
//! phase where the message makes sense, applies it to [`SessionState`],
//! and records a [`GameEvent`]. Handlers never touch the socket.
//!
//! They are public so an embedding game can wrap one when it registers
//! its own handler for the same discriminant.

use clashlink_protocol::{
    GameEnded, GameStarted, GameWillStartIn, Message, MessageType,
    Participant, PlayerChangedNick, PlayerChangedState, PlayerConnected,
    PlayerDisconnected, PlayerHurt, ResourceAdded, ResourceGathered,
    UnitCreated, UnitDestroyed, UnitQueued, WireMessage,
};

use crate::{
    GameEvent, Handled, LocalResource, MatchState, Phase, Router,
    SessionError, SessionState, Table,
};

/// Registers every standard handler on `router`.
pub fn install(router: &mut Router) {
    use MessageType as M;

    router.register(Table::Always, M::PlayerConnected, player_connected);
    router.register(Table::Always, M::PlayerDisconnected, player_disconnected);
    router.register(Table::Always, M::PlayerChangedNick, player_changed_nick);
    router.register(Table::Always, M::PlayerChangedState, player_changed_state);

    router.register(Table::Lobby, M::GameWillStartIn, game_will_start_in);
    router.register(Table::Lobby, M::GameStarted, game_started);

    router.register(Table::InGame, M::UnitQueued, unit_queued);
    router.register(Table::InGame, M::UnitCreated, unit_created);
    router.register(Table::InGame, M::UnitDestroyed, unit_destroyed);
    router.register(Table::InGame, M::ResourceAdded, resource_added);
    router.register(Table::InGame, M::ResourceGathered, resource_gathered);
    router.register(Table::InGame, M::PlayerHurt, player_hurt);
    router.register(Table::InGame, M::GameEnded, game_ended);
}

/// The running match, or `None` when the phase is not `InGame`.
fn in_game(state: &mut SessionState) -> Option<&mut MatchState> {
    if state.phase() != Phase::InGame {
        return None;
    }
    state.game_mut()
}

// ---------------------------------------------------------------------------
// Always active: roster
// ---------------------------------------------------------------------------

pub fn player_connected(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    let PlayerConnected { user_id, nick } = PlayerConnected::from_message(msg)?;
    tracing::info!(%user_id, %nick, "player connected");
    state.roster_mut().insert(Participant {
        user_id,
        nick: nick.clone(),
        ready: false,
    });
    state.push_event(GameEvent::PlayerJoined { user_id, nick });
    Ok(Handled::Consumed)
}

pub fn player_disconnected(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    let PlayerDisconnected { user_id, reason } =
        PlayerDisconnected::from_message(msg)?;
    let Some(gone) = state.roster_mut().remove(user_id) else {
        return Err(SessionError::desync(format!(
            "disconnect for unknown user {user_id}"
        )));
    };
    tracing::info!(%user_id, nick = %gone.nick, %reason, "player disconnected");
    state.push_event(GameEvent::PlayerLeft {
        user_id,
        nick: gone.nick,
        reason,
    });
    Ok(Handled::Consumed)
}

pub fn player_changed_nick(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    let PlayerChangedNick { user_id, nick } =
        PlayerChangedNick::from_message(msg)?;
    let Some(old) = state.roster_mut().rename(user_id, nick.clone()) else {
        return Err(SessionError::desync(format!(
            "nick change for unknown user {user_id}"
        )));
    };
    tracing::info!(%user_id, %old, new = %nick, "player changed nick");
    state.push_event(GameEvent::NickChanged {
        user_id,
        old,
        new: nick,
    });
    Ok(Handled::Consumed)
}

pub fn player_changed_state(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    let PlayerChangedState { user_id } = PlayerChangedState::from_message(msg)?;
    let Some(ready) = state.roster_mut().toggle_ready(user_id) else {
        return Err(SessionError::desync(format!(
            "state change for unknown user {user_id}"
        )));
    };
    tracing::info!(
        %user_id,
        state = if ready { "ready-to-play" } else { "spectator" },
        "player changed state"
    );
    state.push_event(GameEvent::ReadyChanged { user_id, ready });
    Ok(Handled::Consumed)
}

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

pub fn game_will_start_in(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    if state.phase() != Phase::Lobby {
        return Ok(Handled::Deferred);
    }
    let GameWillStartIn { millis } = GameWillStartIn::from_message(msg)?;
    tracing::info!(millis, "match countdown");
    state.push_event(GameEvent::Countdown { millis });
    Ok(Handled::Consumed)
}

pub fn game_started(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    if state.phase() != Phase::Lobby {
        return Ok(Handled::Deferred);
    }
    let started = GameStarted::from_message(msg)?;
    state.start_match(&started)?;
    tracing::info!(
        player_a = %started.player_a,
        player_b = %started.player_b,
        map = %started.map,
        role = ?state.game().map(MatchState::role),
        "match started"
    );
    Ok(Handled::Consumed)
}

// ---------------------------------------------------------------------------
// In game
// ---------------------------------------------------------------------------

pub fn unit_queued(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    let Some(game) = in_game(state) else {
        return Ok(Handled::Deferred);
    };
    let UnitQueued {
        unit_type,
        accepted,
    } = UnitQueued::from_message(msg)?;
    if accepted {
        game.queue_unit(&unit_type)?;
        tracing::trace!(%unit_type, "unit queued");
    } else {
        tracing::debug!(%unit_type, "unit request refused");
    }
    state.push_event(GameEvent::UnitQueued {
        unit_type,
        accepted,
    });
    Ok(Handled::Consumed)
}

pub fn unit_created(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    let Some(game) = in_game(state) else {
        return Ok(Handled::Deferred);
    };
    let UnitCreated {
        player,
        unit_type,
        unit_id,
    } = UnitCreated::from_message(msg)?;
    game.create_unit(player, &unit_type, unit_id)?;
    tracing::trace!(%unit_id, %unit_type, player, "unit created");
    state.push_event(GameEvent::UnitSpawned {
        player,
        unit_type,
        unit_id,
    });
    Ok(Handled::Consumed)
}

pub fn unit_destroyed(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    let Some(game) = in_game(state) else {
        return Ok(Handled::Deferred);
    };
    let UnitDestroyed { player, unit_id } = UnitDestroyed::from_message(msg)?;
    let unit = game.destroy_unit(player, unit_id)?;
    tracing::trace!(%unit_id, player, "unit destroyed");
    state.push_event(GameEvent::UnitDestroyed {
        player,
        unit_type: unit.unit_type,
        unit_id,
    });
    Ok(Handled::Consumed)
}

pub fn resource_added(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    let Some(game) = in_game(state) else {
        return Ok(Handled::Deferred);
    };
    let added = ResourceAdded::from_message(msg)?;
    game.add_resource(LocalResource {
        id: added.resource_id,
        resource_type: added.resource_type.clone(),
        amount: added.amount,
        position: added.position,
    })?;
    state.push_event(GameEvent::ResourceSpawned {
        resource_id: added.resource_id,
        resource_type: added.resource_type,
        amount: added.amount,
        position: added.position,
    });
    Ok(Handled::Consumed)
}

pub fn resource_gathered(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    let Some(game) = in_game(state) else {
        return Ok(Handled::Deferred);
    };
    let ResourceGathered {
        player,
        unit_id,
        resource_id,
    } = ResourceGathered::from_message(msg)?;
    let resource = game.gather_resource(player, unit_id, resource_id)?;
    state.push_event(GameEvent::ResourceGathered {
        player,
        unit_id,
        resource_id,
        resource_type: resource.resource_type,
        amount: resource.amount,
    });
    Ok(Handled::Consumed)
}

pub fn player_hurt(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    let Some(game) = in_game(state) else {
        return Ok(Handled::Deferred);
    };
    let PlayerHurt { player, amount } = PlayerHurt::from_message(msg)?;
    let health = game.hurt(player, amount)?;
    tracing::debug!(player, amount, health, "player hurt");
    state.push_event(GameEvent::PlayerHurt { player, health });
    Ok(Handled::Consumed)
}

pub fn game_ended(
    msg: &Message,
    state: &mut SessionState,
) -> Result<Handled, SessionError> {
    if state.phase() != Phase::InGame {
        return Ok(Handled::Deferred);
    }
    let GameEnded { winner } = GameEnded::from_message(msg)?;
    state.end_match(winner)?;
    tracing::info!(winner, "match ended");
    Ok(Handled::Consumed)
}

#[cfg(test)]
mod tests {
    use clashlink_protocol::{PROTOCOL_VERSION, PlayerAccepted, UserId};

    use super::*;

    fn lobby() -> SessionState {
        let mut state = SessionState::new(PROTOCOL_VERSION);
        state
            .accept(PlayerAccepted {
                user_id: UserId(7),
                players: vec![Participant {
                    user_id: UserId(3),
                    nick: "Alice".into(),
                    ready: false,
                }],
                available_nations: vec![],
            })
            .unwrap();
        state.take_events();
        state
    }

    #[test]
    fn test_install_fills_all_three_tables() {
        let router = Router::default();
        assert_eq!(router.table(Table::Always).len(), 4);
        assert_eq!(router.table(Table::Lobby).len(), 2);
        assert_eq!(router.table(Table::InGame).len(), 7);
        assert!(!router.routes(MessageType::PlayerAccepted));
    }

    #[test]
    fn test_player_changed_state_toggles_ready() {
        let mut state = lobby();
        let msg = PlayerChangedState { user_id: UserId(3) }
            .to_message()
            .unwrap();

        assert_eq!(player_changed_state(&msg, &mut state), Ok(Handled::Consumed));
        assert!(state.roster().get(UserId(3)).unwrap().ready);
        assert_eq!(
            state.take_events(),
            vec![GameEvent::ReadyChanged {
                user_id: UserId(3),
                ready: true
            }]
        );
    }

    #[test]
    fn test_player_changed_nick_unknown_user_is_desync() {
        let mut state = lobby();
        let msg = PlayerChangedNick {
            user_id: UserId(99),
            nick: "Ghost".into(),
        }
        .to_message()
        .unwrap();

        assert!(matches!(
            player_changed_nick(&msg, &mut state),
            Err(SessionError::Desync(_))
        ));
    }

    #[test]
    fn test_player_disconnected_removes_from_roster() {
        let mut state = lobby();
        let msg = PlayerDisconnected {
            user_id: UserId(3),
            reason: clashlink_protocol::DisconnectReason::Quit,
        }
        .to_message()
        .unwrap();

        player_disconnected(&msg, &mut state).unwrap();
        assert!(state.roster().is_empty());
    }

    #[test]
    fn test_game_started_outside_lobby_is_deferred() {
        let mut state = SessionState::new(PROTOCOL_VERSION);
        let msg = GameStarted {
            player_a: UserId(3),
            player_b: UserId(7),
            map: "default".into(),
        }
        .to_message()
        .unwrap();

        assert_eq!(game_started(&msg, &mut state), Ok(Handled::Deferred));
        assert_eq!(state.phase(), Phase::Connecting);
    }

    #[test]
    fn test_unit_created_before_match_is_deferred() {
        let mut state = lobby();
        let msg = UnitCreated {
            player: 0,
            unit_type: "Archer".into(),
            unit_id: clashlink_protocol::EntityId(1),
        }
        .to_message()
        .unwrap();

        assert_eq!(unit_created(&msg, &mut state), Ok(Handled::Deferred));
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let mut state = lobby();
        let msg = Message::new(MessageType::PlayerConnected, vec![1u8]);
        assert!(matches!(
            player_connected(&msg, &mut state),
            Err(SessionError::Decode(_))
        ));
        assert_eq!(state.roster().len(), 1);
    }
}
