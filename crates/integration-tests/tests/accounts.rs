mod support;

use std::sync::Arc;

use domains::{DomainError, MockMailer, UserRepository};
use services::accounts::{ForgotPasswordInput, LoginInput, ProfileChanges, ResetPasswordInput};
use support::World;

#[tokio::test]
async fn invitation_activates_exactly_once() {
    let world = World::new();
    let accounts = &world.services.accounts;
    let input = world.registration();
    let email = input.email.clone();

    let user = accounts.register(input).await.unwrap();
    assert!(!user.is_active);

    let login = || LoginInput {
        email: email.clone(),
        password: "correct horse".to_string(),
    };
    assert!(matches!(
        accounts.login(login()).await,
        Err(DomainError::Unauthorized(_))
    ));

    let token = world.mail.last_token().unwrap();
    accounts.activate(&token).await.unwrap();
    assert!(matches!(
        accounts.activate(&token).await,
        Err(DomainError::Validation(_))
    ));

    let session = accounts.login(login()).await.unwrap();
    let me = accounts.authenticate(&session).await.unwrap();
    assert_eq!(me.id, user.id);
    assert!(me.is_active);
}

#[tokio::test]
async fn registration_is_rolled_back_when_mail_fails() {
    let mut mailer = MockMailer::new();
    mailer
        .expect_send_invitation()
        .returning(|_, _| Err(DomainError::internal("smtp unreachable")));
    let world = World::with_mailer(Arc::new(mailer));

    let input = world.registration();
    let email = input.email.clone();
    let err = world.services.accounts.register(input).await.unwrap_err();
    assert!(err.is_internal());

    let stored = UserRepository::find_credentials_by_email(&*world.store, &email)
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn password_reset_is_single_use() {
    let world = World::new();
    let accounts = &world.services.accounts;
    let user = world.user().await;

    accounts
        .forgot_password(ForgotPasswordInput {
            email: user.email.clone(),
        })
        .await
        .unwrap();
    let token = world.mail.last_token().unwrap();

    let reset = |password: &str| ResetPasswordInput {
        token: token.clone(),
        password: password.to_string(),
    };
    accounts.reset_password(reset("a brand new secret")).await.unwrap();
    assert!(matches!(
        accounts.reset_password(reset("yet another secret")).await,
        Err(DomainError::Validation(_))
    ));

    let session = accounts
        .login(LoginInput {
            email: user.email.clone(),
            password: "a brand new secret".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(accounts.authenticate(&session).await.unwrap().id, user.id);
}

#[tokio::test]
async fn unknown_address_gets_no_reset_mail() {
    let world = World::new();
    world
        .services
        .accounts
        .forgot_password(ForgotPasswordInput {
            email: "nobody@example.com".to_string(),
        })
        .await
        .unwrap();
    assert!(world.mail.last_token().is_none());
}

#[tokio::test]
async fn deleted_account_cannot_authenticate() {
    let world = World::new();
    let accounts = &world.services.accounts;
    let user = world.user().await;
    let session = accounts
        .login(LoginInput {
            email: user.email.clone(),
            password: "correct horse".to_string(),
        })
        .await
        .unwrap();

    accounts.delete_account(&user).await.unwrap();
    assert!(matches!(
        accounts.authenticate(&session).await,
        Err(DomainError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn profile_edits_show_on_the_public_profile() {
    let world = World::new();
    let accounts = &world.services.accounts;
    let user = world.user().await;
    let neighbour = world.user().await;

    let taken = accounts
        .update_profile(
            &user,
            ProfileChanges {
                username: Some(neighbour.username.clone()),
                ..ProfileChanges::default()
            },
        )
        .await;
    assert!(matches!(taken, Err(DomainError::Conflict(_))));

    let updated = accounts
        .update_profile(
            &user,
            ProfileChanges {
                name: Some("Margaret Hamilton".to_string()),
                username: Some("hamilton".to_string()),
                bio: Some("Wrote the Apollo flight software".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.email, user.email);

    let public = accounts.public_profile("hamilton").await.unwrap();
    assert_eq!(public.id, user.id);
    assert_eq!(public.name, "Margaret Hamilton");
    assert_eq!(public.bio.as_deref(), Some("Wrote the Apollo flight software"));
    assert_eq!(
        accounts.public_profile(&user.username).await.unwrap_err(),
        DomainError::NotFound("user")
    );
}

#[tokio::test]
async fn unactivated_accounts_stay_hidden() {
    let world = World::new();
    let accounts = &world.services.accounts;
    let input = world.registration();
    let username = input.username.clone();
    accounts.register(input).await.unwrap();

    assert_eq!(
        accounts.public_profile(&username).await.unwrap_err(),
        DomainError::NotFound("user")
    );
}
